//! The worker slot table: a fixed-capacity array shared across the
//! launcher and every worker it forks, memory-mapped from a file under the
//! catalog's directory.
//!
//! Cross-process mutual exclusion is provided by `flock`-ing a sibling
//! `.lock` file around every access that touches more than one field —
//! single-field polling of `basebackup_in_use` or similar is not offered
//! here since nothing in this crate needs lock-free polling of shared
//! memory from more than one field at a time; every accessor here already
//! takes the lock. This reuses `crate::lock` rather than inventing a
//! second interprocess mutex primitive.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use super::error::ShmError;

pub const MAX_WORKER_SLOTS: usize = 64;
pub const CHILD_MAX: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawChildSlot {
    pid: i32,
    backup_id: i64,
}

const EMPTY_CHILD: RawChildSlot = RawChildSlot { pid: 0, backup_id: 0 };

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawWorkerSlot {
    pid: i32,
    cmd_tag: u16,
    archive_id: i64,
    started: i64,
    basebackup_in_use: u8,
    children: [RawChildSlot; CHILD_MAX],
}

const EMPTY_SLOT: RawWorkerSlot = RawWorkerSlot {
    pid: 0,
    cmd_tag: 0,
    archive_id: 0,
    started: 0,
    basebackup_in_use: 0,
    children: [EMPTY_CHILD; CHILD_MAX],
};

#[repr(C)]
struct RawSegment {
    slots: [RawWorkerSlot; MAX_WORKER_SLOTS],
}

const SEGMENT_SIZE: usize = std::mem::size_of::<RawSegment>();

/// An in-memory (non-shared) view of one slot, for callers that don't want
/// to poke at the raw layout directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerEntry {
    pub pid: i32,
    pub cmd_tag: u16,
    pub archive_id: i64,
    pub started: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildEntry {
    pub pid: i32,
    pub backup_id: i64,
}

pub struct WorkerShm {
    mmap: MmapMut,
    lock_path: PathBuf,
}

impl WorkerShm {
    /// Create the segment file if it doesn't exist, then map it. Workers
    /// that only attach (never create) should use [`Self::attach`].
    pub fn create_or_open(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        if is_new {
            file.set_len(SEGMENT_SIZE as u64)?;
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { mmap, lock_path: Self::lock_path_for(path) })
    }

    /// Attach to an already-existing segment; fails if it does not exist,
    /// matching §4.3's "attach-only; must already exist" worker rule.
    pub fn attach(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShmError::SegmentMissing(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { mmap, lock_path: Self::lock_path_for(path) })
    }

    fn lock_path_for(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn with_lock<T>(&mut self, body: impl FnOnce(&mut RawSegment) -> T) -> Result<T, ShmError> {
        let lock_file = crate::lock::UnlockedFile::try_from(self.lock_path.as_path())?;
        let locked = lock_file.lock_exclusive()?;
        let segment = self.segment_mut();
        let result = body(segment);
        drop(locked);
        Ok(result)
    }

    fn segment_mut(&mut self) -> &mut RawSegment {
        debug_assert_eq!(self.mmap.len(), SEGMENT_SIZE);
        unsafe { &mut *self.mmap.as_mut_ptr().cast::<RawSegment>() }
    }

    /// Find the first free slot, write `entry`, and return its index.
    pub fn allocate(&mut self, entry: WorkerEntry) -> Result<usize, ShmError> {
        self.with_lock(|segment| {
            segment
                .slots
                .iter_mut()
                .position(|slot| slot.pid == 0)
                .map(|index| {
                    segment.slots[index] = RawWorkerSlot {
                        pid: entry.pid,
                        cmd_tag: entry.cmd_tag,
                        archive_id: entry.archive_id,
                        started: entry.started,
                        basebackup_in_use: 0,
                        children: [EMPTY_CHILD; CHILD_MAX],
                    };
                    index
                })
        })?
        .ok_or(ShmError::NoFreeSlot(MAX_WORKER_SLOTS))
    }

    /// Zero a slot and all of its child sub-slots.
    pub fn free(&mut self, index: usize) -> Result<(), ShmError> {
        self.with_lock(|segment| {
            if let Some(slot) = segment.slots.get_mut(index) {
                *slot = EMPTY_SLOT;
                Ok(())
            } else {
                Err(ShmError::SlotNotAllocated(index))
            }
        })?
    }

    /// Record a child process under `index`'s first free child sub-slot
    /// (`pid <= 0`).
    pub fn add_child(&mut self, index: usize, child: ChildEntry) -> Result<(), ShmError> {
        self.with_lock(|segment| {
            let slot = segment
                .slots
                .get_mut(index)
                .ok_or(ShmError::SlotNotAllocated(index))?;
            let child_slot = slot
                .children
                .iter_mut()
                .find(|c| c.pid <= 0)
                .ok_or(ShmError::NoFreeChildSlot(index, CHILD_MAX))?;
            *child_slot = RawChildSlot { pid: child.pid, backup_id: child.backup_id };
            slot.basebackup_in_use = u8::from(slot.children.iter().any(|c| c.backup_id != 0));
            Ok(())
        })?
    }

    /// Clear a child's `backup_id` and recompute `basebackup_in_use` over
    /// the remaining children.
    pub fn detach_basebackup(&mut self, index: usize, child_pid: i32) -> Result<(), ShmError> {
        self.with_lock(|segment| {
            let slot = segment
                .slots
                .get_mut(index)
                .ok_or(ShmError::SlotNotAllocated(index))?;
            for child in &mut slot.children {
                if child.pid == child_pid {
                    child.backup_id = 0;
                }
            }
            slot.basebackup_in_use = u8::from(slot.children.iter().any(|c| c.backup_id != 0));
            Ok(())
        })?
    }

    /// Free the slot (or child sub-slot) belonging to `pid`, as the crash
    /// reaper does after `SIGCHLD`. Returns whether anything was freed.
    pub fn reap(&mut self, pid: i32) -> Result<bool, ShmError> {
        self.with_lock(|segment| {
            for slot in &mut segment.slots {
                if slot.pid == pid {
                    *slot = EMPTY_SLOT;
                    return true;
                }
                for child in &mut slot.children {
                    if child.pid == pid {
                        *child = EMPTY_CHILD;
                        slot.basebackup_in_use =
                            u8::from(slot.children.iter().any(|c| c.backup_id != 0));
                        return true;
                    }
                }
            }
            false
        })
    }

    /// Backup ids currently referenced by any child sub-slot across every
    /// worker — the input the retention engine needs for `locked_by_shm`.
    pub fn referenced_backup_ids(&mut self) -> Result<std::collections::HashSet<i64>, ShmError> {
        self.with_lock(|segment| {
            segment
                .slots
                .iter()
                .flat_map(|slot| slot.children.iter())
                .filter(|c| c.backup_id != 0)
                .map(|c| c.backup_id)
                .collect()
        })
    }

    pub fn snapshot(&mut self) -> Result<Vec<(usize, WorkerEntry)>, ShmError> {
        self.with_lock(|segment| {
            segment
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.pid != 0)
                .map(|(index, slot)| {
                    (
                        index,
                        WorkerEntry {
                            pid: slot.pid,
                            cmd_tag: slot.cmd_tag,
                            archive_id: slot.archive_id,
                            started: slot.started,
                        },
                    )
                })
                .collect()
        })
    }
}

/// A single-pid segment used to ensure only one launcher runs per catalog.
/// Implemented over `crate::lock`'s `flock` wrapper: holding the exclusive
/// lock for the process lifetime *is* the "only one launcher" guarantee,
/// and its non-blocking variant is exactly the "fail if already running"
/// check the spec calls for.
pub struct LauncherGuard {
    _locked: crate::lock::LockedFileExclusive,
}

impl LauncherGuard {
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>, ShmError> {
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.write_all(format!("{}\n", std::process::id()).as_bytes())?;
        let unlocked = crate::lock::UnlockedFile::try_from(path.as_ref())?;
        match unlocked.try_lock_exclusive()? {
            either::Either::Right(locked) => Ok(Some(Self { _locked: locked })),
            either::Either::Left(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_free_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut shm = WorkerShm::create_or_open(dir.path().join("workers.shm")).unwrap();
        let entry = WorkerEntry { pid: 1234, cmd_tag: 7, archive_id: 1, started: 100 };
        let index = shm.allocate(entry).unwrap();
        assert_eq!(shm.snapshot().unwrap(), vec![(index, entry)]);
        shm.free(index).unwrap();
        assert!(shm.snapshot().unwrap().is_empty());
    }

    #[test]
    fn attach_without_creation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkerShm::attach(dir.path().join("missing.shm")).unwrap_err();
        assert!(matches!(err, ShmError::SegmentMissing(_)));
    }

    #[test]
    fn basebackup_in_use_tracks_children() {
        let dir = tempfile::tempdir().unwrap();
        let mut shm = WorkerShm::create_or_open(dir.path().join("workers.shm")).unwrap();
        let index = shm
            .allocate(WorkerEntry { pid: 1, cmd_tag: 0, archive_id: 1, started: 0 })
            .unwrap();
        shm.add_child(index, ChildEntry { pid: 2, backup_id: 42 }).unwrap();
        let referenced = shm.referenced_backup_ids().unwrap();
        assert!(referenced.contains(&42));
        shm.detach_basebackup(index, 2).unwrap();
        let referenced = shm.referenced_backup_ids().unwrap();
        assert!(!referenced.contains(&42));
    }

    #[test]
    fn second_launcher_guard_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher.lock");
        let first = LauncherGuard::try_acquire(&path).unwrap();
        assert!(first.is_some());
        let second = LauncherGuard::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }
}
