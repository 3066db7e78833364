//! In-memory domain objects ("descriptors") for every catalog entity.
//!
//! Every descriptor that participates in partial updates carries an
//! `affected: Vec<Column>` vector alongside its fields. Setter methods
//! assign the field *and* push the column tag onto that vector — this is
//! the "affected-column protocol": the catalog generates parameterized SQL
//! from the vector and binds values from the descriptor in the same order,
//! so partial updates don't require one method per column combination.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::xlog::{Timeline, XLogRecPtr, DEFAULT_WAL_SEGMENT_SIZE};

/// A column identifier for one entity kind. Each entity's column enum is
/// its own type so that `affected: Vec<ArchiveColumn>` cannot accidentally
/// be populated with, say, a `BaseBackupColumn`.
pub trait Column: Copy + Eq + std::fmt::Debug {
    /// The SQL column name this tag binds to.
    fn sql_name(self) -> &'static str;

    /// Whether this column is computed (fetch-only). Binding a computed
    /// column is a programmer error and must panic — see
    /// `catalog::mod::assert_bindable`.
    fn is_computed(self) -> bool {
        false
    }
}

macro_rules! column_enum {
    ($name:ident { $($variant:ident => $sql:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl Column for $name {
            fn sql_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $sql),+
                }
            }
        }
    };
}

// ---------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------

column_enum!(ArchiveColumn {
    Name => "name",
    Directory => "directory",
    CompressionFlag => "compression_flag",
});

#[derive(Debug, Clone, Default)]
pub struct ArchiveDescr {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub directory: Option<PathBuf>,
    pub compression_flag: bool,
    pub affected: Vec<ArchiveColumn>,
}

impl ArchiveDescr {
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self.affected.push(ArchiveColumn::Name);
        self
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) -> &mut Self {
        self.directory = Some(directory.into());
        self.affected.push(ArchiveColumn::Directory);
        self
    }

    pub fn set_compression_flag(&mut self, flag: bool) -> &mut Self {
        self.compression_flag = flag;
        self.affected.push(ArchiveColumn::CompressionFlag);
        self
    }

    /// Absolute path to `<directory>/base`.
    #[must_use]
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.directory.as_ref().map(|d| d.join("base"))
    }

    /// Absolute path to `<directory>/log`.
    #[must_use]
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.directory.as_ref().map(|d| d.join("log"))
    }
}

// ---------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    Basebackup,
    Streamer,
}

impl ConnectionType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            ConnectionType::Basebackup => "basebackup",
            ConnectionType::Streamer => "streamer",
        }
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basebackup" => Ok(ConnectionType::Basebackup),
            "streamer" => Ok(ConnectionType::Streamer),
            other => Err(format!("unknown connection type: {other}")),
        }
    }
}

column_enum!(ConnectionColumn {
    Dsn => "dsn",
    Host => "host",
    Port => "port",
    User => "user_name",
    Dbname => "dbname",
});

#[derive(Debug, Clone, Default)]
pub struct ConnectionDescr {
    pub id: Option<i64>,
    pub archive_id: Option<i64>,
    pub conn_type: Option<ConnectionType>,
    pub dsn: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub dbname: Option<String>,
    pub affected: Vec<ConnectionColumn>,
}

impl ConnectionDescr {
    /// Setting a DSN invalidates the discrete host/port/user/db fields.
    pub fn set_dsn(&mut self, dsn: impl Into<String>) -> &mut Self {
        self.dsn = Some(dsn.into());
        self.host = None;
        self.port = None;
        self.user = None;
        self.dbname = None;
        self.affected.retain(|c| *c == ConnectionColumn::Dsn);
        self.affected.push(ConnectionColumn::Dsn);
        self
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.host = Some(host.into());
        self.affected.push(ConnectionColumn::Host);
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self.affected.push(ConnectionColumn::Port);
        self
    }

    pub fn set_user(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = Some(user.into());
        self.affected.push(ConnectionColumn::User);
        self
    }

    pub fn set_dbname(&mut self, dbname: impl Into<String>) -> &mut Self {
        self.dbname = Some(dbname.into());
        self.affected.push(ConnectionColumn::Dbname);
        self
    }
}

// ---------------------------------------------------------------------
// BackupProfile
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressType {
    None,
    Gzip,
    Zstd,
    Xz,
    Plain,
}

impl CompressType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            CompressType::None => "none",
            CompressType::Gzip => "gzip",
            CompressType::Zstd => "zstd",
            CompressType::Xz => "xz",
            CompressType::Plain => "plain",
        }
    }
}

impl std::str::FromStr for CompressType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressType::None),
            "gzip" => Ok(CompressType::Gzip),
            "zstd" => Ok(CompressType::Zstd),
            "xz" => Ok(CompressType::Xz),
            "plain" => Ok(CompressType::Plain),
            other => Err(format!("unknown compress type: {other}")),
        }
    }
}

column_enum!(BackupProfileColumn {
    Name => "name",
    CompressType => "compress_type",
    MaxRate => "max_rate",
    Label => "label",
    FastCheckpoint => "fast_checkpoint",
    IncludeWal => "include_wal",
    WaitForWal => "wait_for_wal",
    NoverifyChecksums => "noverify_checksums",
    Manifest => "manifest",
    ManifestChecksums => "manifest_checksums",
});

#[derive(Debug, Clone)]
pub struct BackupProfileDescr {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub compress_type: CompressType,
    pub max_rate: Option<u32>,
    pub label: String,
    pub fast_checkpoint: bool,
    pub include_wal: bool,
    pub wait_for_wal: bool,
    pub noverify_checksums: bool,
    pub manifest: bool,
    pub manifest_checksums: bool,
    pub affected: Vec<BackupProfileColumn>,
}

impl Default for BackupProfileDescr {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            compress_type: CompressType::None,
            max_rate: None,
            label: "archivectl_basebackup".to_owned(),
            fast_checkpoint: false,
            include_wal: false,
            wait_for_wal: true,
            noverify_checksums: false,
            manifest: true,
            manifest_checksums: false,
            affected: Vec::new(),
        }
    }
}

impl BackupProfileDescr {
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self.affected.push(BackupProfileColumn::Name);
        self
    }

    pub fn set_compress_type(&mut self, t: CompressType) -> &mut Self {
        self.compress_type = t;
        self.affected.push(BackupProfileColumn::CompressType);
        self
    }

    pub fn set_max_rate(&mut self, rate: u32) -> &mut Self {
        self.max_rate = Some(rate);
        self.affected.push(BackupProfileColumn::MaxRate);
        self
    }

    pub fn set_include_wal(&mut self, v: bool) -> &mut Self {
        self.include_wal = v;
        self.affected.push(BackupProfileColumn::IncludeWal);
        self
    }
}

// ---------------------------------------------------------------------
// BaseBackup
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupStatus {
    InProgress,
    Ready,
    Aborted,
}

impl BackupStatus {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            BackupStatus::InProgress => "in progress",
            BackupStatus::Ready => "ready",
            BackupStatus::Aborted => "aborted",
        }
    }
}

impl std::str::FromStr for BackupStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in progress" => Ok(BackupStatus::InProgress),
            "ready" => Ok(BackupStatus::Ready),
            "aborted" => Ok(BackupStatus::Aborted),
            other => Err(format!("unknown backup status: {other}")),
        }
    }
}

column_enum!(BaseBackupColumn {
    ArchiveId => "archive_id",
    XlogposStart => "xlogpos_start",
    XlogposEnd => "xlogpos_end",
    Timeline => "timeline",
    Label => "label",
    Fsentry => "fsentry",
    Started => "started",
    Stopped => "stopped",
    Pinned => "pinned",
    Status => "status",
    Systemid => "systemid",
    WalSegmentSize => "wal_segment_size",
    UsedProfile => "used_profile",
    // Computed, fetch-only.
    DurationSeconds => "duration_seconds",
    ExceedsRetentionRule => "exceeds_retention_rule",
});

impl BaseBackupColumn {
    #[must_use]
    pub fn is_computed_column(self) -> bool {
        matches!(
            self,
            BaseBackupColumn::DurationSeconds | BaseBackupColumn::ExceedsRetentionRule
        )
    }
}

#[derive(Debug, Clone)]
pub struct BaseBackupDescr {
    pub id: Option<i64>,
    pub archive_id: Option<i64>,
    pub xlogpos_start: Option<XLogRecPtr>,
    pub xlogpos_end: Option<XLogRecPtr>,
    pub timeline: Timeline,
    pub label: Option<String>,
    pub fsentry: Option<PathBuf>,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub status: BackupStatus,
    pub systemid: Option<u64>,
    pub wal_segment_size: u64,
    pub used_profile: Option<i64>,
    pub tablespaces: Vec<BackupTablespaceDescr>,
    // Fetched, never bound.
    pub duration_seconds: Option<i64>,
    pub exceeds_retention_rule: Option<bool>,
    pub affected: Vec<BaseBackupColumn>,
}

impl Default for BaseBackupDescr {
    fn default() -> Self {
        Self {
            id: None,
            archive_id: None,
            xlogpos_start: None,
            xlogpos_end: None,
            timeline: Timeline(1),
            label: None,
            fsentry: None,
            started: None,
            stopped: None,
            pinned: false,
            status: BackupStatus::InProgress,
            systemid: None,
            wal_segment_size: DEFAULT_WAL_SEGMENT_SIZE,
            used_profile: None,
            tablespaces: Vec::new(),
            duration_seconds: None,
            exceeds_retention_rule: None,
            affected: Vec::new(),
        }
    }
}

impl BaseBackupDescr {
    pub fn set_xlogpos_start(&mut self, ptr: XLogRecPtr) -> &mut Self {
        self.xlogpos_start = Some(ptr);
        self.affected.push(BaseBackupColumn::XlogposStart);
        self
    }

    pub fn set_xlogpos_end(&mut self, ptr: XLogRecPtr) -> &mut Self {
        self.xlogpos_end = Some(ptr);
        self.affected.push(BaseBackupColumn::XlogposEnd);
        self
    }

    pub fn set_stopped(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.stopped = Some(at);
        self.affected.push(BaseBackupColumn::Stopped);
        self
    }

    pub fn set_status(&mut self, status: BackupStatus) -> &mut Self {
        self.status = status;
        self.affected.push(BaseBackupColumn::Status);
        self
    }

    pub fn set_pinned(&mut self, pinned: bool) -> &mut Self {
        self.pinned = pinned;
        self.affected.push(BaseBackupColumn::Pinned);
        self
    }

    /// `ready` ⇒ `xlogpos_end ≠ ∅ ∧ stopped ≠ ∅`; `in progress` ⇒ neither is
    /// set; `aborted` has no trustworthy `xlogpos_end`.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            BackupStatus::Ready => {
                self.xlogpos_end.is_some()
                    && self.stopped.is_some()
                    && self.started.is_some()
                    && self.stopped.unwrap() >= self.started.unwrap()
                    && self.xlogpos_end.unwrap() > self.xlogpos_start.unwrap_or_default()
            }
            BackupStatus::InProgress => self.xlogpos_end.is_none() && self.stopped.is_none(),
            BackupStatus::Aborted => true,
        }
    }
}

column_enum!(BackupTablespaceColumn {
    BackupId => "backup_id",
    Spcoid => "spcoid",
    Spclocation => "spclocation",
    Spcsize => "spcsize",
});

#[derive(Debug, Clone, Default)]
pub struct BackupTablespaceDescr {
    pub id: Option<i64>,
    pub backup_id: Option<i64>,
    pub spcoid: u32,
    pub spclocation: Option<PathBuf>,
    pub spcsize: Option<i64>,
    pub affected: Vec<BackupTablespaceColumn>,
}

impl BackupTablespaceDescr {
    /// `spcoid = 0` designates the default tablespace.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.spcoid == 0
    }
}

// ---------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Physical,
    Basebackup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamStatus {
    Starting,
    Streaming,
    Stopped,
    Failed,
}

impl StreamStatus {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            StreamStatus::Starting => "starting",
            StreamStatus::Streaming => "streaming",
            StreamStatus::Stopped => "stopped",
            StreamStatus::Failed => "failed",
        }
    }
}

column_enum!(StreamColumn {
    ArchiveId => "archive_id",
    Stype => "stype",
    SlotName => "slot_name",
    Systemid => "systemid",
    Timeline => "timeline",
    Xlogpos => "xlogpos",
    Dbname => "dbname",
    Status => "status",
});

#[derive(Debug, Clone, Default)]
pub struct StreamDescr {
    pub id: Option<i64>,
    pub archive_id: Option<i64>,
    pub stype: Option<StreamType>,
    pub slot_name: Option<String>,
    pub systemid: Option<u64>,
    pub timeline: Option<Timeline>,
    pub xlogpos: Option<XLogRecPtr>,
    pub dbname: Option<String>,
    pub status: Option<StreamStatus>,
    pub create_date: Option<DateTime<Utc>>,
    pub affected: Vec<StreamColumn>,
}

// ---------------------------------------------------------------------
// CatalogProc
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcType {
    Launcher,
    Streamer,
    Worker,
}

impl ProcType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            ProcType::Launcher => "launcher",
            ProcType::Streamer => "streamer",
            ProcType::Worker => "worker",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcState {
    Running,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct CatalogProcDescr {
    pub pid: i32,
    pub archive_id: Option<i64>,
    pub proc_type: ProcType,
    pub started: DateTime<Utc>,
    pub state: ProcState,
    pub shm_key: i64,
    pub shm_id: i64,
}

// ---------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionRuleType {
    KeepWithLabel,
    DropWithLabel,
    KeepNum,
    DropNum,
    KeepNewerDt,
    KeepOlderDt,
    DropNewerDt,
    DropOlderDt,
    Pin,
    Unpin,
    Cleanup,
}

#[derive(Debug, Clone)]
pub enum RetentionRuleValue {
    Regex(String),
    Count(u32),
    Interval(super::interval::RetentionIntervalExpr),
    /// For `pin`/`unpin`: one of `by_id(n)`, `count(k)`, `newest`, `oldest`,
    /// `pinned` (unpin-only).
    PinSelector(PinSelector),
    /// No associated value (`cleanup`).
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSelector {
    ById(i64),
    Count(u32),
    Newest,
    Oldest,
    Pinned,
}

#[derive(Debug, Clone)]
pub struct RetentionRuleDescr {
    pub id: Option<i64>,
    pub policy_id: Option<i64>,
    pub rule_type: RetentionRuleType,
    pub value: RetentionRuleValue,
}

#[derive(Debug, Clone, Default)]
pub struct RetentionPolicyDescr {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub rules: Vec<RetentionRuleDescr>,
}

// ---------------------------------------------------------------------
// CleanupDescriptor — the product of one retention evaluation.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    None,
    WalCleanupOffset,
    WalCleanupRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasebackupMode {
    Delete,
    Keep,
}

#[derive(Debug, Clone, Copy)]
pub struct TimelineCutoff {
    pub cleanup_start_ptr: XLogRecPtr,
    pub wal_segment_size: u64,
}

#[derive(Debug, Clone)]
pub struct CleanupDescriptor {
    pub mode: CleanupMode,
    pub basebackup_mode: BasebackupMode,
    pub basebackups: Vec<i64>,
    pub per_timeline_offsets: std::collections::BTreeMap<Timeline, TimelineCutoff>,
    /// Pin/unpin rules the policy carried, gathered but not yet issued as
    /// a batch update — `ApplyRetentionPolicy` performs these against the
    /// catalog before acting on `basebackups`.
    pub pin_actions: Vec<(PinSelector, bool)>,
    pub warnings: Vec<String>,
}

impl Default for CleanupDescriptor {
    fn default() -> Self {
        Self {
            mode: CleanupMode::None,
            basebackup_mode: BasebackupMode::Keep,
            basebackups: Vec::new(),
            per_timeline_offsets: std::collections::BTreeMap::new(),
            pin_actions: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
