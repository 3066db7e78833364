//! Worker process lifecycle: fork from the launcher, attach to the shared
//! slot table, run one action, free the slot on the way out.
//!
//! A worker never creates the shared-memory segment itself — it only
//! attaches to one the launcher already created — matching the
//! attach-only discipline for workers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::Catalog;

use super::error::WorkerError;
use super::shm::{ChildEntry, WorkerEntry, WorkerShm};

/// Frees its slot when dropped, including on an early return from a
/// failing action, so a worker can never leak its own entry.
struct SlotGuard<'a> {
    shm: &'a mut WorkerShm,
    index: usize,
    /// Set once the worker has folded itself into a child sub-slot of
    /// another worker (the "worker-child" case) so the guard's `Drop`
    /// does not double-release an already-freed slot.
    disarmed: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.disarmed {
            let _ = self.shm.free(self.index);
        }
    }
}

/// One action a worker executes between allocating and freeing its slot.
/// `command::dispatch` (built on top of this crate's catalog and archive
/// modules) supplies the concrete implementations; this trait only fixes
/// the boundary so `worker` does not need to depend on the command parser.
pub trait WorkerAction {
    /// A tag identifying what kind of work this is, stored in the slot so
    /// `LIST ...` style introspection can show what a worker is doing.
    fn cmd_tag(&self) -> u16;

    fn archive_id(&self) -> i64;

    fn run(&self, catalog: &mut Catalog, shm: &mut WorkerShm, slot_index: usize) -> Result<(), WorkerError>;
}

/// Run one worker action to completion inside the *current* process (the
/// caller is expected to have already forked).
pub fn run_worker(
    catalog_path: &std::path::Path,
    shm_path: &std::path::Path,
    action: &dyn WorkerAction,
) -> Result<(), WorkerError> {
    let mut catalog = Catalog::open(catalog_path)?;
    let mut shm = WorkerShm::attach(shm_path)?;

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();

    let index = shm.allocate(WorkerEntry {
        pid: std::process::id() as i32,
        cmd_tag: action.cmd_tag(),
        archive_id: action.archive_id(),
        started,
    })?;
    let mut guard = SlotGuard { shm: &mut shm, index, disarmed: false };

    action.run(&mut catalog, guard.shm, index)
}

/// Record a long-running child process (WAL streamer, base-backup
/// streamer) as a sub-slot of `parent_index`.
pub fn register_child(shm: &mut WorkerShm, parent_index: usize, child_pid: i32, backup_id: i64) -> Result<(), WorkerError> {
    shm.add_child(parent_index, ChildEntry { pid: child_pid, backup_id })
        .map_err(Into::into)
}

/// Release a previously-registered child sub-slot without freeing the
/// parent worker's own slot.
pub fn unregister_child(shm: &mut WorkerShm, parent_index: usize, child_pid: i32) -> Result<(), WorkerError> {
    shm.detach_basebackup(parent_index, child_pid).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ArchiveDescr, BackupStatus};

    struct NoopAction {
        archive_id: i64,
    }

    impl WorkerAction for NoopAction {
        fn cmd_tag(&self) -> u16 {
            1
        }

        fn archive_id(&self) -> i64 {
            self.archive_id
        }

        fn run(&self, catalog: &mut Catalog, shm: &mut WorkerShm, slot_index: usize) -> Result<(), WorkerError> {
            // Touch both handles so the test proves they were wired through.
            let snapshot = shm.snapshot()?;
            assert!(snapshot.iter().any(|(index, _)| *index == slot_index));
            let mut descr = ArchiveDescr::default();
            descr.set_name("probe");
            let _ = catalog.list_archives()?;
            let _ = BackupStatus::Ready;
            let _ = descr;
            Ok(())
        }
    }

    #[test]
    fn worker_allocates_and_frees_its_slot() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.db");
        let shm_path = dir.path().join("workers.shm");
        Catalog::open(&catalog_path).unwrap();
        WorkerShm::create_or_open(&shm_path).unwrap();

        let action = NoopAction { archive_id: 1 };
        run_worker(&catalog_path, &shm_path, &action).unwrap();

        let mut shm = WorkerShm::attach(&shm_path).unwrap();
        assert!(shm.snapshot().unwrap().is_empty());
    }
}
