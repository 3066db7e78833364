use archivectl::catalog::{BackupProfileDescr, CompressType};
use archivectl::command::Command;

#[derive(clap::Subcommand, Debug)]
pub enum ProfileCommand {
    /// Register a named base-backup profile.
    Create {
        name: String,
        #[clap(long, default_value = "none")]
        compress_type: String,
        #[clap(long)]
        max_rate: Option<u32>,
        #[clap(long)]
        fast_checkpoint: bool,
        #[clap(long)]
        include_wal: bool,
        #[clap(long)]
        no_manifest: bool,
    },
    /// Remove a base-backup profile.
    Drop { name: String },
    /// List all registered profiles.
    List,
}

impl ProfileCommand {
    pub fn into_command(self) -> Result<Command, String> {
        Ok(match self {
            ProfileCommand::Create {
                name,
                compress_type,
                max_rate,
                fast_checkpoint,
                include_wal,
                no_manifest,
            } => {
                let compress_type: CompressType =
                    compress_type.parse().map_err(|e: String| e)?;
                let mut descr = BackupProfileDescr { name: Some(name), ..Default::default() };
                descr.set_compress_type(compress_type);
                if let Some(rate) = max_rate {
                    descr.set_max_rate(rate);
                }
                descr.fast_checkpoint = fast_checkpoint;
                descr.include_wal = include_wal;
                descr.manifest = !no_manifest;
                Command::CreateBackupProfile { descr }
            }
            ProfileCommand::Drop { name } => Command::DropBackupProfile { name },
            ProfileCommand::List => Command::ListBackupProfile,
        })
    }
}
