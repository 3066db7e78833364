//! Bounded-concurrency directory replication.
//!
//! Mirrors the teacher's coordination style (mutex + condvar guarding a
//! small shared struct) rather than reaching for a work-stealing executor:
//! the copy manager's concurrency is deliberately capped and its state
//! machine small enough that a condvar-driven free-slot stack is the
//! natural fit.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{info, warn};

use super::error::ArchiveError;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

struct Shared {
    free_slots: Mutex<Vec<usize>>,
    cv: Condvar,
    finalize: AtomicBool,
    exit: Arc<AtomicBool>,
    errors: Mutex<Vec<String>>,
}

/// Replicate `source` into `target` with up to `max_copy_instances`
/// concurrent file copies. `target` must not exist or must be empty.
pub struct CopyManager {
    max_copy_instances: usize,
    exit_flag: Arc<AtomicBool>,
}

impl CopyManager {
    #[must_use]
    pub fn new(max_copy_instances: usize) -> Self {
        Self {
            max_copy_instances: max_copy_instances.max(1),
            exit_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An externally-held handle that can be used to cancel an in-flight
    /// `run`. Workers observe it at chunk boundaries.
    #[must_use]
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exit_flag)
    }

    pub fn stop(&self) {
        self.exit_flag.store(true, Ordering::SeqCst);
    }

    pub fn run(&self, source: &Path, target: &Path) -> Result<(), ArchiveError> {
        if target.exists() && target.read_dir()?.next().is_some() {
            return Err(ArchiveError::Copy(format!(
                "target {} is not empty",
                target.display()
            )));
        }
        std::fs::create_dir_all(target)?;

        let shared = Arc::new(Shared {
            free_slots: Mutex::new((0..self.max_copy_instances).collect()),
            cv: Condvar::new(),
            finalize: AtomicBool::new(false),
            exit: Arc::clone(&self.exit_flag),
            errors: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::new();
        self.walk(source, target, &shared, &mut handles)?;

        shared.finalize.store(true, Ordering::SeqCst);
        for handle in handles {
            let _ = handle.join();
        }

        let errors = shared.errors.lock().expect("copy manager mutex poisoned");
        if let Some(first) = errors.first() {
            return Err(ArchiveError::Copy(first.clone()));
        }
        Ok(())
    }

    fn walk(
        &self,
        source: &Path,
        target: &Path,
        shared: &Arc<Shared>,
        handles: &mut Vec<thread::JoinHandle<()>>,
    ) -> Result<(), ArchiveError> {
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let dest = target.join(entry.file_name());

            if shared.exit.load(Ordering::SeqCst) {
                return Ok(());
            }

            if file_type.is_symlink() {
                warn!("skipping symlink during copy: {}", entry.path().display());
                continue;
            }
            if file_type.is_dir() {
                std::fs::create_dir_all(&dest)?;
                self.walk(&entry.path(), &dest, shared, handles)?;
                continue;
            }

            let slot = Self::acquire_slot(shared);
            let src_path = entry.path();
            let shared = Arc::clone(shared);
            handles.push(thread::spawn(move || {
                if let Err(err) = copy_file(&src_path, &dest, &shared.exit) {
                    shared
                        .errors
                        .lock()
                        .expect("copy manager mutex poisoned")
                        .push(format!("{}: {err}", src_path.display()));
                }
                let mut free = shared.free_slots.lock().expect("copy manager mutex poisoned");
                free.push(slot);
                shared.cv.notify_one();
            }));
        }
        Ok(())
    }

    fn acquire_slot(shared: &Arc<Shared>) -> usize {
        let mut free = shared.free_slots.lock().expect("copy manager mutex poisoned");
        loop {
            if let Some(slot) = free.pop() {
                return slot;
            }
            free = shared.cv.wait(free).expect("copy manager mutex poisoned");
        }
    }
}

fn copy_file(src: &Path, dst: &Path, exit: &AtomicBool) -> Result<(), ArchiveError> {
    use std::io::{Read, Write};

    let mut source = std::fs::File::open(src)?;
    let mut target = std::fs::File::create(dst)?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        if exit.load(Ordering::SeqCst) {
            info!("copy of {} cancelled mid-transfer", src.display());
            return Ok(());
        }
        let read = source.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        target.write_all(&buffer[..read])?;
    }
    target.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_nested_tree() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(src_dir.path().join("sub")).unwrap();
        std::fs::write(src_dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(src_dir.path().join("sub/b.txt"), b"world").unwrap();

        let manager = CopyManager::new(2);
        let target = dst_dir.path().join("copy");
        manager.run(src_dir.path(), &target).unwrap();

        assert_eq!(std::fs::read(target.join("a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(target.join("sub/b.txt")).unwrap(), b"world");
    }

    #[test]
    fn rejects_nonempty_target() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        std::fs::write(dst_dir.path().join("preexisting"), b"x").unwrap();

        let manager = CopyManager::new(2);
        let err = manager.run(src_dir.path(), dst_dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Copy(_)));
    }
}
