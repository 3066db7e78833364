pub mod archive;
pub mod basebackup;
pub mod connection;
pub mod exec;
pub mod launcher;
pub mod pin;
pub mod profile;
pub mod retention;
pub mod streaming;
pub mod variable;

use std::path::PathBuf;

use archivectl::command::Command;

use archive::ArchiveCommand;
use basebackup::BasebackupCommand;
use connection::ConnectionCommand;
use exec::ExecArgs;
use launcher::{LauncherArgs, ShowWorkersArgs};
use pin::{PinArgs, UnpinArgs};
use profile::ProfileCommand;
use retention::RetentionCommand;
use streaming::StreamingCommand;
use variable::VariableCommand;

#[derive(clap::Subcommand, Debug)]
pub enum TopCommand {
    /// Manage archives.
    #[clap(subcommand)]
    Archive(ArchiveCommand),

    /// Manage base-backup profiles.
    #[clap(subcommand)]
    Profile(ProfileCommand),

    /// Manage per-archive streaming connections.
    #[clap(subcommand)]
    Connection(ConnectionCommand),

    /// Manage base backups.
    #[clap(subcommand)]
    Basebackup(BasebackupCommand),

    /// Manage continuous WAL streaming and recovery streams.
    #[clap(subcommand)]
    Streaming(StreamingCommand),

    /// Pin a base backup so retention cleanup will not remove it.
    Pin(PinArgs),

    /// Release a previously pinned base backup.
    Unpin(UnpinArgs),

    /// Manage retention policies.
    #[clap(subcommand)]
    Retention(RetentionCommand),

    /// Inspect or change runtime variables.
    #[clap(subcommand)]
    Variable(VariableCommand),

    /// Start the background launcher for this catalog.
    Launcher(LauncherArgs),

    /// Report the worker slot table of a running launcher.
    ShowWorkers(ShowWorkersArgs),

    /// Run an arbitrary external command (e.g. a cleanup hook).
    Exec(ExecArgs),
}

impl TopCommand {
    pub fn into_archivectl_command(self, runtime_dir: PathBuf) -> Result<Command, String> {
        Ok(match self {
            TopCommand::Archive(cmd) => cmd.into_command(),
            TopCommand::Profile(cmd) => cmd.into_command()?,
            TopCommand::Connection(cmd) => cmd.into_command(),
            TopCommand::Basebackup(cmd) => cmd.into_command(),
            TopCommand::Streaming(cmd) => cmd.into_command(),
            TopCommand::Pin(args) => args.into_command(),
            TopCommand::Unpin(args) => args.into_command(),
            TopCommand::Retention(cmd) => cmd.into_command(),
            TopCommand::Variable(cmd) => cmd.into_command(),
            TopCommand::Launcher(args) => args.into_command(runtime_dir),
            TopCommand::ShowWorkers(args) => args.into_command(runtime_dir),
            TopCommand::Exec(args) => args.into_command(),
        })
    }
}
