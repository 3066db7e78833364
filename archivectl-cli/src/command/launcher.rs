use std::path::PathBuf;

use archivectl::command::Command;

#[derive(clap::Args, Debug)]
pub struct LauncherArgs {
    /// Stay attached instead of forking into the background.
    #[clap(long)]
    pub foreground: bool,
}

impl LauncherArgs {
    #[must_use]
    pub fn into_command(self, runtime_dir: PathBuf) -> Command {
        Command::StartLauncher { runtime_dir, foreground: self.foreground }
    }
}

#[derive(clap::Args, Debug)]
pub struct ShowWorkersArgs {}

impl ShowWorkersArgs {
    #[must_use]
    pub fn into_command(self, runtime_dir: PathBuf) -> Command {
        Command::ShowWorkers { runtime_dir }
    }
}
