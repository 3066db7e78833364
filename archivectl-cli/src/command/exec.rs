use archivectl::command::Command;

#[derive(clap::Args, Debug)]
pub struct ExecArgs {
    /// The external command to run, e.g. `"pg_archivecleanup /wal 000..."`.
    pub command: String,
}

impl ExecArgs {
    #[must_use]
    pub fn into_command(self) -> Command {
        Command::Exec { command: self.command }
    }
}
