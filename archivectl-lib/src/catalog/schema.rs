//! Catalog DDL and the schema-check magic number.
//!
//! The magic number is bumped whenever the schema changes in a way that
//! requires a matching binary. On open, the catalog checks the `version`
//! table's stored magic is `>=` this implementation's compiled magic.

/// Bump this when a schema migration is required.
pub const CATALOG_MAGIC: i64 = 1;

pub const REQUIRED_TABLES: &[&str] = &[
    "version",
    "archive",
    "connections",
    "backup",
    "backup_tablespaces",
    "backup_profiles",
    "stream",
    "procs",
    "retention",
    "retention_rules",
];

/// The full DDL, executed inside a single transaction on first open.
pub const DDL: &str = r"
CREATE TABLE IF NOT EXISTS version (
    number INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS archive (
    id                INTEGER PRIMARY KEY,
    name              TEXT NOT NULL UNIQUE,
    directory         TEXT NOT NULL,
    compression_flag  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS connections (
    id          INTEGER PRIMARY KEY,
    archive_id  INTEGER NOT NULL REFERENCES archive(id) ON DELETE CASCADE,
    type        TEXT NOT NULL CHECK (type IN ('basebackup', 'streamer')),
    dsn         TEXT,
    host        TEXT,
    port        INTEGER,
    user_name   TEXT,
    dbname      TEXT,
    UNIQUE (archive_id, type)
);

CREATE TABLE IF NOT EXISTS backup_profiles (
    id                  INTEGER PRIMARY KEY,
    name                TEXT NOT NULL UNIQUE,
    compress_type       TEXT NOT NULL DEFAULT 'none',
    max_rate            INTEGER,
    label               TEXT NOT NULL DEFAULT 'archivectl_basebackup',
    fast_checkpoint     INTEGER NOT NULL DEFAULT 0,
    include_wal         INTEGER NOT NULL DEFAULT 0,
    wait_for_wal        INTEGER NOT NULL DEFAULT 1,
    noverify_checksums  INTEGER NOT NULL DEFAULT 0,
    manifest            INTEGER NOT NULL DEFAULT 1,
    manifest_checksums  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS backup (
    id                INTEGER PRIMARY KEY,
    archive_id        INTEGER NOT NULL REFERENCES archive(id) ON DELETE CASCADE,
    xlogpos_start     TEXT,
    xlogpos_end       TEXT,
    timeline          INTEGER NOT NULL DEFAULT 1,
    label             TEXT,
    fsentry           TEXT NOT NULL,
    started           TEXT,
    stopped           TEXT,
    pinned            INTEGER NOT NULL DEFAULT 0,
    status            TEXT NOT NULL DEFAULT 'in progress',
    systemid          INTEGER,
    wal_segment_size  INTEGER NOT NULL DEFAULT 16777216,
    used_profile      INTEGER REFERENCES backup_profiles(id)
);

CREATE TABLE IF NOT EXISTS backup_tablespaces (
    id           INTEGER PRIMARY KEY,
    backup_id    INTEGER NOT NULL REFERENCES backup(id) ON DELETE CASCADE,
    spcoid       INTEGER NOT NULL,
    spclocation  TEXT,
    spcsize      INTEGER
);

CREATE TABLE IF NOT EXISTS stream (
    id           INTEGER PRIMARY KEY,
    archive_id   INTEGER NOT NULL REFERENCES archive(id) ON DELETE CASCADE,
    stype        TEXT NOT NULL,
    slot_name    TEXT,
    systemid     INTEGER,
    timeline     INTEGER,
    xlogpos      TEXT,
    dbname       TEXT,
    status       TEXT NOT NULL,
    create_date  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS procs (
    pid         INTEGER NOT NULL,
    archive_id  INTEGER REFERENCES archive(id) ON DELETE CASCADE,
    type        TEXT NOT NULL CHECK (type IN ('launcher', 'streamer', 'worker')),
    started     TEXT NOT NULL,
    state       TEXT NOT NULL CHECK (state IN ('running', 'shutdown')),
    shm_key     INTEGER NOT NULL,
    shm_id      INTEGER NOT NULL,
    PRIMARY KEY (pid, archive_id, type)
);

CREATE TABLE IF NOT EXISTS retention (
    id       INTEGER PRIMARY KEY,
    name     TEXT NOT NULL UNIQUE,
    created  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS retention_rules (
    id         INTEGER PRIMARY KEY,
    policy_id  INTEGER NOT NULL REFERENCES retention(id) ON DELETE CASCADE,
    type       TEXT NOT NULL,
    value      TEXT
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_tables_all_appear_in_ddl() {
        for table in REQUIRED_TABLES {
            assert!(
                DDL.contains(&format!("TABLE IF NOT EXISTS {table} ")),
                "missing DDL for {table}"
            );
        }
    }
}
