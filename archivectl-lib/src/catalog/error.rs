use std::path::PathBuf;

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("input/output error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("catalog at {0} is missing required table {1:?}")]
    #[diagnostic(help("the catalog file may be from an unrelated program; point --catalog at a fresh path"))]
    MissingTable(PathBuf, &'static str),

    #[error("catalog at {path} has magic {found}, but this binary requires at least {required}")]
    #[diagnostic(help("upgrade archivectl, or rebuild the catalog from scratch"))]
    SchemaTooOld { path: PathBuf, found: i64, required: i64 },

    #[error("attempted to bind computed column {0:?}; computed columns are fetch-only")]
    ComputedColumnBound(&'static str),

    #[error("archive name {0:?} is already in use")]
    DuplicateArchiveName(String),

    #[error("no archive named {0:?}")]
    NoSuchArchive(String),

    #[error("no backup profile named {0:?}")]
    NoSuchBackupProfile(String),

    #[error("no base backup {0:?} in archive {1:?}")]
    NoSuchBaseBackup(String, String),

    #[error("no retention policy named {0:?}")]
    NoSuchRetentionPolicy(String),

    #[error("no {0} connection registered for archive {1:?}")]
    NoSuchConnection(&'static str, String),

    #[error("xlog record pointer parse error: {0}")]
    XLogRecPtr(#[from] crate::xlog::XLogRecPtrParseError),

    #[error("retention interval parse error: {0}")]
    IntervalParse(#[from] super::interval::IntervalParseError),

    #[error("transaction failed: {0}")]
    Transaction(String),
}
