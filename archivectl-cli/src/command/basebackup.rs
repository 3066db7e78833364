use archivectl::command::{Command, Verbosity};

#[derive(clap::Subcommand, Debug)]
pub enum BasebackupCommand {
    /// Start a base backup for an archive.
    Start {
        archive: String,
        #[clap(long)]
        profile: Option<String>,
        #[clap(long)]
        force_systemid_update: bool,
    },
    /// Remove a base backup's catalog entry.
    Drop { archive: String, id: i64 },
    /// List base backups registered for an archive.
    List {
        archive: String,
        #[clap(long)]
        verbose: bool,
    },
}

impl BasebackupCommand {
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            BasebackupCommand::Start { archive, profile, force_systemid_update } => {
                Command::StartBasebackup { archive, profile, force_systemid_update }
            }
            BasebackupCommand::Drop { archive, id } => Command::DropBasebackup { id, archive },
            BasebackupCommand::List { archive, verbose } => Command::ListBasebackups {
                archive,
                verbosity: if verbose { Verbosity::Verbose } else { Verbosity::Summary },
            },
        }
    }
}
