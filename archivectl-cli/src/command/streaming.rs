use archivectl::command::Command;

#[derive(clap::Subcommand, Debug)]
pub enum StreamingCommand {
    /// Start continuous WAL streaming for an archive.
    Start {
        archive: String,
        #[clap(long)]
        restart: bool,
        #[clap(long)]
        nodetach: bool,
    },
    /// Stop continuous WAL streaming for an archive.
    Stop { archive: String },
    /// Start a recovery stream (read-only replay endpoint) for an archive.
    Recovery {
        archive: String,
        #[clap(long)]
        port: Option<u16>,
        #[clap(long = "listen-on")]
        listen_on: Vec<String>,
    },
}

impl StreamingCommand {
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            StreamingCommand::Start { archive, restart, nodetach } => {
                Command::StartStreaming { archive, restart, nodetach }
            }
            StreamingCommand::Stop { archive } => Command::StopStreaming { archive },
            StreamingCommand::Recovery { archive, port, listen_on } => {
                Command::StartRecoveryStream { archive, port, listen_on }
            }
        }
    }
}
