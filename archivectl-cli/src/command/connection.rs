use archivectl::catalog::ConnectionDescr;
use archivectl::command::Command;

use crate::args::ConnectionArgs;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ConnTypeArg {
    Basebackup,
    Streamer,
}

impl From<ConnTypeArg> for archivectl::catalog::ConnectionType {
    fn from(value: ConnTypeArg) -> Self {
        match value {
            ConnTypeArg::Basebackup => archivectl::catalog::ConnectionType::Basebackup,
            ConnTypeArg::Streamer => archivectl::catalog::ConnectionType::Streamer,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum ConnectionCommand {
    /// Register (or replace) a streaming connection for an archive.
    Create {
        archive: String,
        #[clap(value_enum)]
        conn_type: ConnTypeArg,
        #[clap(flatten)]
        connection: ConnectionArgs,
    },
    /// Remove a streaming connection from an archive.
    Drop {
        archive: String,
        #[clap(value_enum)]
        conn_type: ConnTypeArg,
    },
    /// List connections configured for an archive.
    List { archive: String },
}

impl ConnectionCommand {
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            ConnectionCommand::Create { archive, conn_type, connection } => {
                let descr = ConnectionDescr {
                    conn_type: Some(conn_type.into()),
                    dsn: connection.dsn,
                    host: connection.host,
                    port: connection.port,
                    user: connection.user,
                    dbname: connection.dbname,
                    ..Default::default()
                };
                Command::CreateStreamingConnection { archive, descr }
            }
            ConnectionCommand::Drop { archive, conn_type } => {
                Command::DropStreamingConnection { archive, conn_type: conn_type.into() }
            }
            ConnectionCommand::List { archive } => Command::ListConnection { archive },
        }
    }
}
