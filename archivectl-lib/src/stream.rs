//! The replication-stream abstraction: everything this crate needs from an
//! upstream PostgreSQL instance, behind a trait so catalog/retention code
//! never has to know whether it's talking to a real server or a test
//! double.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use uuid::Uuid;

use crate::catalog::{BackupProfileDescr, CompressType};
use crate::xlog::{Timeline, XLogRecPtr};

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum StreamError {
    #[error("replication connection failed: {0}")]
    #[diagnostic(help("check the connection's host/port/user/dbname or DSN"))]
    Connection(#[from] postgres::Error),

    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xlog record pointer parse error: {0}")]
    XLogRecPtr(#[from] crate::xlog::XLogRecPtrParseError),

    #[error("server did not return a value for setting {0:?}")]
    MissingSetting(String),

    #[error("replication slot {0:?} already exists")]
    SlotAlreadyExists(String),

    #[error("no connection details configured for this stream")]
    NotConfigured,

    #[error("basebackup failed: {0}")]
    Basebackup(String),
}

/// The result of `IDENTIFY_SYSTEM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifySystem {
    pub systemid: u64,
    pub timeline: Timeline,
    pub xlogpos: XLogRecPtr,
    pub dbname: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateSlotOptions {
    pub reserve_wal: bool,
    pub existing_ok: bool,
    pub no_identok: bool,
}

/// Connection parameters for a replication-mode connection, mirroring the
/// catalog's `ConnectionDescr` but decoupled from it so a stream can be
/// built from a DSN or discrete fields interchangeably.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub dsn: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub dbname: Option<String>,
}

/// Contractual operations an upstream PostgreSQL replication source must
/// support. XLOG pointers round-trip losslessly between `hex/hex` text and
/// the 64-bit integer in [`XLogRecPtr`].
pub trait ReplicationStream {
    fn connect(&mut self, params: &ConnectParams) -> Result<(), StreamError>;

    fn test_connection(&mut self) -> Result<(), StreamError>;

    fn identify(&mut self) -> Result<IdentifySystem, StreamError>;

    fn get_server_setting(&mut self, name: &str) -> Result<String, StreamError>;

    /// A replication-slot name derived from `prefix` plus a fresh random
    /// suffix, guaranteed unique across calls within a process.
    fn generate_slot_name_uuid(&self, prefix: &str) -> String {
        format!("{prefix}_{}", Uuid::new_v4().simple())
    }

    fn create_physical_replication_slot(
        &mut self,
        slot_name: &str,
        options: &CreateSlotOptions,
    ) -> Result<(), StreamError>;

    /// Fetch one timeline history file's name and raw contents.
    fn timeline_history_file_content(&mut self, tli: Timeline) -> Result<(String, Vec<u8>), StreamError>;

    /// Start a WAL streamer as a detached child process (e.g. an external
    /// `pg_receivewal`-equivalent). The caller registers the returned
    /// child's pid in a worker sub-slot.
    fn walstreamer(&mut self, slot_name: &str, dest_dir: &Path) -> Result<Child, StreamError>;

    /// Run a base backup into `dest_dir` according to `profile`, returning
    /// the starting and ending WAL positions actually observed.
    fn basebackup(&mut self, profile: &BackupProfileDescr, dest_dir: &Path) -> Result<(XLogRecPtr, XLogRecPtr), StreamError>;
}

/// A test double that records calls instead of talking to a server.
#[derive(Debug, Default)]
pub struct NullReplicationStream {
    pub connected: bool,
    pub identify_response: Option<IdentifySystem>,
}

impl ReplicationStream for NullReplicationStream {
    fn connect(&mut self, _params: &ConnectParams) -> Result<(), StreamError> {
        self.connected = true;
        Ok(())
    }

    fn test_connection(&mut self) -> Result<(), StreamError> {
        if self.connected {
            Ok(())
        } else {
            Err(StreamError::NotConfigured)
        }
    }

    fn identify(&mut self) -> Result<IdentifySystem, StreamError> {
        self.identify_response.clone().ok_or(StreamError::NotConfigured)
    }

    fn get_server_setting(&mut self, name: &str) -> Result<String, StreamError> {
        match name {
            "wal_segment_size" => Ok("16777216".to_owned()),
            other => Err(StreamError::MissingSetting(other.to_owned())),
        }
    }

    fn create_physical_replication_slot(
        &mut self,
        _slot_name: &str,
        _options: &CreateSlotOptions,
    ) -> Result<(), StreamError> {
        Ok(())
    }

    fn timeline_history_file_content(&mut self, tli: Timeline) -> Result<(String, Vec<u8>), StreamError> {
        Ok((format!("{tli}.history"), Vec::new()))
    }

    fn walstreamer(&mut self, _slot_name: &str, _dest_dir: &Path) -> Result<Child, StreamError> {
        Command::new("true").stdout(Stdio::null()).spawn().map_err(StreamError::Io)
    }

    fn basebackup(&mut self, _profile: &BackupProfileDescr, _dest_dir: &Path) -> Result<(XLogRecPtr, XLogRecPtr), StreamError> {
        Ok((XLogRecPtr::ZERO, XLogRecPtr::ZERO))
    }
}

/// The real implementation, built on the synchronous `postgres` crate
/// exactly as the teacher's cluster connects to its managed cluster.
pub struct PostgresReplicationStream {
    client: Option<postgres::Client>,
}

impl Default for PostgresReplicationStream {
    fn default() -> Self {
        Self { client: None }
    }
}

impl PostgresReplicationStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&mut self) -> Result<&mut postgres::Client, StreamError> {
        self.client.as_mut().ok_or(StreamError::NotConfigured)
    }
}

impl ReplicationStream for PostgresReplicationStream {
    fn connect(&mut self, params: &ConnectParams) -> Result<(), StreamError> {
        let client = if let Some(dsn) = &params.dsn {
            let mut config: postgres::Config = dsn.parse().map_err(StreamError::Connection)?;
            config.replication_mode(postgres::config::ReplicationMode::Physical);
            config.connect(postgres::NoTls)?
        } else {
            let mut config = postgres::Config::new();
            if let Some(host) = &params.host {
                config.host(host);
            }
            if let Some(port) = params.port {
                config.port(port);
            }
            if let Some(user) = &params.user {
                config.user(user);
            }
            if let Some(dbname) = &params.dbname {
                config.dbname(dbname);
            }
            config.replication_mode(postgres::config::ReplicationMode::Physical);
            config.connect(postgres::NoTls)?
        };
        self.client = Some(client);
        Ok(())
    }

    fn test_connection(&mut self) -> Result<(), StreamError> {
        self.client()?.simple_query("SELECT 1")?;
        Ok(())
    }

    fn identify(&mut self) -> Result<IdentifySystem, StreamError> {
        let rows = self.client()?.simple_query("IDENTIFY_SYSTEM")?;
        let row = rows
            .into_iter()
            .find_map(|message| match message {
                postgres::SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .ok_or(StreamError::NotConfigured)?;

        let systemid: u64 = row.get(0).unwrap_or("0").parse().unwrap_or(0);
        let timeline = Timeline(row.get(1).and_then(|s| s.parse().ok()).unwrap_or(1));
        let xlogpos: XLogRecPtr = row.get(2).unwrap_or("0/0").parse()?;
        let dbname = row.get(3).map(str::to_owned);

        Ok(IdentifySystem { systemid, timeline, xlogpos, dbname })
    }

    fn get_server_setting(&mut self, name: &str) -> Result<String, StreamError> {
        let row = self
            .client()?
            .query_one("SHOW $1", &[&name])
            .map_err(StreamError::Connection)?;
        Ok(row.get(0))
    }

    fn create_physical_replication_slot(
        &mut self,
        slot_name: &str,
        options: &CreateSlotOptions,
    ) -> Result<(), StreamError> {
        let mut command = format!("CREATE_REPLICATION_SLOT {slot_name} PHYSICAL");
        if options.reserve_wal {
            command.push_str(" RESERVE_WAL");
        }
        match self.client()?.simple_query(&command) {
            Ok(_) => Ok(()),
            Err(err) if options.existing_ok && err.to_string().contains("already exists") => Ok(()),
            Err(err) => {
                if err.to_string().contains("already exists") {
                    Err(StreamError::SlotAlreadyExists(slot_name.to_owned()))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    fn timeline_history_file_content(&mut self, tli: Timeline) -> Result<(String, Vec<u8>), StreamError> {
        let command = format!("TIMELINE_HISTORY {}", tli.0);
        let rows = self.client()?.simple_query(&command)?;
        let row = rows
            .into_iter()
            .find_map(|message| match message {
                postgres::SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .ok_or(StreamError::NotConfigured)?;
        let filename = row.get(0).unwrap_or_default().to_owned();
        let content = row.get(1).unwrap_or_default().as_bytes().to_vec();
        Ok((filename, content))
    }

    fn walstreamer(&mut self, slot_name: &str, dest_dir: &Path) -> Result<Child, StreamError> {
        Command::new("pg_receivewal")
            .arg("--slot")
            .arg(slot_name)
            .arg("--directory")
            .arg(dest_dir)
            .arg("--no-loop")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(StreamError::Io)
    }

    fn basebackup(&mut self, profile: &BackupProfileDescr, dest_dir: &Path) -> Result<(XLogRecPtr, XLogRecPtr), StreamError> {
        let start = self.identify()?.xlogpos;

        let mut command = Command::new("pg_basebackup");
        command.arg("--pgdata").arg(dest_dir).arg("--format=plain");
        if profile.fast_checkpoint {
            command.arg("--checkpoint=fast");
        }
        if profile.include_wal {
            command.arg("--wal-method=stream");
        }
        if profile.manifest {
            command.arg("--manifest-checksums").arg(if profile.manifest_checksums { "SHA256" } else { "NONE" });
        }
        match profile.compress_type {
            CompressType::Gzip => {
                command.arg("--compress=gzip");
            }
            CompressType::Zstd => {
                command.arg("--compress=zstd");
            }
            CompressType::None | CompressType::Plain | CompressType::Xz => {}
        }
        if let Some(rate) = profile.max_rate {
            command.arg("--max-rate").arg(rate.to_string());
        }

        let status = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(StreamError::Io)?;
        if !status.success() {
            return Err(StreamError::Basebackup(format!("pg_basebackup exited with {status}")));
        }

        let end = self.identify()?.xlogpos;
        Ok((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_stream_requires_connect_first() {
        let mut stream = NullReplicationStream::default();
        assert!(matches!(stream.test_connection(), Err(StreamError::NotConfigured)));
        stream.connect(&ConnectParams::default()).unwrap();
        stream.test_connection().unwrap();
    }

    #[test]
    fn generated_slot_names_are_unique() {
        let stream = NullReplicationStream::default();
        let a = stream.generate_slot_name_uuid("archivectl");
        let b = stream.generate_slot_name_uuid("archivectl");
        assert_ne!(a, b);
        assert!(a.starts_with("archivectl_"));
    }

    #[test]
    fn null_stream_reports_default_wal_segment_size() {
        let mut stream = NullReplicationStream::default();
        assert_eq!(stream.get_server_setting("wal_segment_size").unwrap(), "16777216");
    }
}
