//! The catalog: durable, transactional metadata for every archive.
//!
//! Backed by `rusqlite` (bundled SQLite) rather than the teacher's
//! `sqlx`/`postgres` stack, because the catalog here is *our own* local
//! metadata store, not the upstream database being backed up — see
//! `DESIGN.md` for the grounding of this one deliberate stack substitution.
//!
//! Concurrency is single-writer via SQLite's own file locking; a long busy
//! timeout means concurrent maintenance doesn't spuriously fail short
//! statements. WAL journal mode and foreign keys are enabled on open.

pub mod descr;
pub mod error;
pub mod interval;
pub mod retention;

mod archive_ops;
mod backup_ops;
mod connection_ops;
mod proc_ops;
mod profile_ops;
mod retention_ops;
mod stream_ops;

use std::path::{Path, PathBuf};

use rusqlite::Connection;

pub use backup_ops::BackupSelector;
pub use descr::*;
pub use error::CatalogError;

/// Busy timeout for statement execution: maintenance operations (retention
/// cleanup, schema migration) can legitimately hold the writer lock for a
/// while, and short reads/writes from other workers should wait rather than
/// fail.
const BUSY_TIMEOUT_MS: u32 = 60_000;

pub struct Catalog {
    conn: Connection,
    path: PathBuf,
}

impl Catalog {
    /// Open (creating if necessary) the catalog at `path`, verify its
    /// schema, and return a handle ready for use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(std::time::Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut catalog = Self { conn, path };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    /// Open an existing catalog read-only. Used by workers that only need
    /// to query, and by anything that must not risk schema initialization
    /// races with a concurrently-starting launcher.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
        let catalog = Self { conn, path };
        catalog.check_schema()?;
        Ok(catalog)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_schema(&mut self) -> Result<(), CatalogError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(schema::DDL)?;
        let count: i64 = tx.query_row("SELECT COUNT(*) FROM version", [], |row| row.get(0))?;
        if count == 0 {
            tx.execute(
                "INSERT INTO version (number) VALUES (?1)",
                [schema::CATALOG_MAGIC],
            )?;
        }
        tx.commit()?;
        self.check_schema()
    }

    fn check_schema(&self) -> Result<(), CatalogError> {
        for table in schema::REQUIRED_TABLES {
            let exists: bool = self.conn.query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(CatalogError::MissingTable(self.path.clone(), table));
            }
        }
        let found: i64 = self
            .conn
            .query_row("SELECT number FROM version LIMIT 1", [], |row| row.get(0))?;
        if found < schema::CATALOG_MAGIC {
            return Err(CatalogError::SchemaTooOld {
                path: self.path.clone(),
                found,
                required: schema::CATALOG_MAGIC,
            });
        }
        Ok(())
    }

    /// Run `body` inside an exclusive transaction. On any error the
    /// transaction is rolled back (via `Drop`, since we never call
    /// `commit`) and the error propagates unchanged.
    pub fn transaction<T>(
        &mut self,
        body: impl FnOnce(&rusqlite::Transaction) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = body(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub mod schema;

/// Assert at runtime that no computed column appears in an affected-columns
/// vector about to be bound. A programmer error, per §4.1: "attempting to
/// bind a computed column is a programmer error and must raise."
pub(crate) fn assert_bindable(columns: &[BaseBackupColumn]) {
    for col in columns {
        assert!(
            !col.is_computed_column(),
            "attempted to bind computed column {col:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        (dir, catalog)
    }

    #[test]
    fn open_creates_all_required_tables() {
        let (_dir, _catalog) = open_tmp();
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let _first = Catalog::open(&path).unwrap();
        let _second = Catalog::open(&path).unwrap();
    }

    #[test]
    fn rejects_catalog_with_newer_required_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let catalog = Catalog::open(&path).unwrap();
            catalog
                .conn()
                .execute("UPDATE version SET number = -1", [])
                .unwrap();
        }
        let err = Catalog::open(&path).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaTooOld { .. }));
    }
}
