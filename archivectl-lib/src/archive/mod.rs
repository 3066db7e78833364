//! Archive directory layout, WAL segment classification, the polymorphic
//! file abstraction, and the directory copy manager.

pub mod copymgr;
pub mod error;
pub mod file;
pub mod segment;

use std::path::{Path, PathBuf};

use chrono::Utc;

pub use error::ArchiveError;

const SIGNATURE_FILE: &str = "PG_BACKUP_CTL_INFO";

/// A canonical archive directory: `<root>/base`, `<root>/log`, and a
/// signature file at the root.
#[derive(Debug, Clone)]
pub struct ArchiveDir {
    root: PathBuf,
}

impl ArchiveDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.root.join("base")
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    #[must_use]
    pub fn signature_path(&self) -> PathBuf {
        self.root.join(SIGNATURE_FILE)
    }

    /// Lay down `base/` and `log/` under `root`, creating `root` itself if
    /// necessary. Idempotent.
    pub fn create(&self) -> Result<(), ArchiveError> {
        std::fs::create_dir_all(self.base_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    /// Write (or rewrite) the signature file: `"<catalog_magic> | <timestamp>"`.
    pub fn write_signature(&self, catalog_magic: i64) -> Result<(), ArchiveError> {
        let contents = format!("{catalog_magic} | {}", Utc::now().to_rfc3339());
        std::fs::write(self.signature_path(), contents)?;
        Ok(())
    }

    /// Read and validate the signature file, returning its stored magic
    /// number.
    pub fn verify(&self) -> Result<i64, ArchiveError> {
        let path = self.signature_path();
        if !path.exists() {
            return Err(ArchiveError::SignatureMissing(path));
        }
        let contents = std::fs::read_to_string(&path)?;
        let magic = contents
            .split('|')
            .next()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| ArchiveError::SignatureMalformed(path.clone()))?;
        Ok(magic)
    }

    /// Bare filenames currently in `log/`, for classification or
    /// start-position discovery.
    pub fn log_entries(&self) -> Result<Vec<String>, ArchiveError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.log_dir())? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        Ok(names)
    }

    /// Directory holding one basebackup's data, named after its label.
    #[must_use]
    pub fn backup_dir(&self, label: &str) -> PathBuf {
        self.base_dir().join(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_verify_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ArchiveDir::new(dir.path());
        archive.create().unwrap();
        archive.write_signature(1).unwrap();
        assert_eq!(archive.verify().unwrap(), 1);
    }

    #[test]
    fn verify_without_signature_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ArchiveDir::new(dir.path());
        archive.create().unwrap();
        assert!(matches!(archive.verify(), Err(ArchiveError::SignatureMissing(_))));
    }

    #[test]
    fn log_entries_lists_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ArchiveDir::new(dir.path());
        archive.create().unwrap();
        std::fs::write(archive.log_dir().join("000000010000000000000001"), b"").unwrap();
        let entries = archive.log_entries().unwrap();
        assert_eq!(entries, vec!["000000010000000000000001"]);
    }
}
