use std::path::PathBuf;

use archivectl::catalog::ArchiveDescr;
use archivectl::command::{Command, Verbosity};

#[derive(clap::Subcommand, Debug)]
pub enum ArchiveCommand {
    /// Register a new archive.
    Create {
        name: String,
        /// Directory to hold this archive's `base/` and `log/` trees.
        directory: PathBuf,
        #[clap(long)]
        compression: bool,
    },
    /// Remove an archive's catalog entry. Does not touch its directory.
    Drop { name: String },
    /// Change an archive's directory or compression flag.
    Alter {
        name: String,
        #[clap(long)]
        directory: Option<PathBuf>,
        #[clap(long)]
        compression: Option<bool>,
    },
    /// Re-check an archive's signature file.
    Verify { name: String },
    /// List all registered archives.
    List {
        #[clap(long)]
        verbose: bool,
    },
}

impl ArchiveCommand {
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            ArchiveCommand::Create { name, directory, compression } => {
                let mut descr = ArchiveDescr::default();
                descr.set_name(name);
                descr.set_directory(directory);
                descr.set_compression_flag(compression);
                Command::CreateArchive { descr }
            }
            ArchiveCommand::Drop { name } => Command::DropArchive { name },
            ArchiveCommand::Alter { name, directory, compression } => {
                let mut descr = ArchiveDescr::default();
                if let Some(directory) = directory {
                    descr.set_directory(directory);
                }
                if let Some(compression) = compression {
                    descr.set_compression_flag(compression);
                }
                Command::AlterArchive { name, descr }
            }
            ArchiveCommand::Verify { name } => Command::VerifyArchive { name },
            ArchiveCommand::List { verbose } => Command::ListArchive {
                verbosity: if verbose { Verbosity::Verbose } else { Verbosity::Summary },
            },
        }
    }
}
