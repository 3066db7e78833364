//! The process supervisor: a launcher that owns one catalog and one
//! shared-memory slot table, reads commands off a per-catalog queue, forks
//! a worker per command, and reaps crashed workers on `SIGCHLD`.

pub mod error;
pub mod queue;
pub mod shm;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use log::info;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, fork, setsid, ForkResult};

pub use error::{LauncherError, QueueError, ShmError, WorkerError};
pub use queue::CommandQueue;
pub use shm::{ChildEntry, LauncherGuard, WorkerEntry, WorkerShm};
pub use worker::{run_worker, WorkerAction};

/// What the main loop should do once it next checks in. Written only from
/// signal handlers, so it has to be an atomic, not a plain field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownMode {
    Running = 0,
    /// `SIGTERM`: unregister from the catalog, close it, exit.
    Smart = 1,
    /// `SIGINT`/`SIGQUIT`: exit immediately, skip unregistration.
    Emergency = 2,
}

static SHUTDOWN_MODE: AtomicU8 = AtomicU8::new(ShutdownMode::Running as u8);
static STATUS_REFRESH_REQUESTED: AtomicBool = AtomicBool::new(false);
static CHILD_REAP_PENDING: AtomicBool = AtomicBool::new(false);

fn shutdown_mode() -> ShutdownMode {
    match SHUTDOWN_MODE.load(Ordering::SeqCst) {
        1 => ShutdownMode::Smart,
        2 => ShutdownMode::Emergency,
        _ => ShutdownMode::Running,
    }
}

extern "C" fn on_sigterm(_: i32) {
    SHUTDOWN_MODE.store(ShutdownMode::Smart as u8, Ordering::SeqCst);
}

extern "C" fn on_sigint_or_sigquit(_: i32) {
    SHUTDOWN_MODE.store(ShutdownMode::Emergency as u8, Ordering::SeqCst);
}

extern "C" fn on_sighup(_: i32) {
    // Reserved; nothing to reload yet.
}

extern "C" fn on_sigusr1(_: i32) {
    STATUS_REFRESH_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigchld(_: i32) {
    CHILD_REAP_PENDING.store(true, Ordering::SeqCst);
}

/// Install the launcher's full signal set. Only async-signal-safe work
/// happens in the handlers themselves (setting an atomic); everything else
/// happens on the next turn of the main loop.
fn install_signal_handlers() -> Result<(), LauncherError> {
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(on_sigterm))?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(on_sigint_or_sigquit))?;
        signal::signal(Signal::SIGQUIT, SigHandler::Handler(on_sigint_or_sigquit))?;
        signal::signal(Signal::SIGHUP, SigHandler::Handler(on_sighup))?;
        signal::signal(Signal::SIGUSR1, SigHandler::Handler(on_sigusr1))?;
        signal::signal(Signal::SIGCHLD, SigHandler::Handler(on_sigchld))?;
    }
    Ok(())
}

impl From<nix::errno::Errno> for LauncherError {
    fn from(errno: nix::errno::Errno) -> Self {
        LauncherError::Io(std::io::Error::from_raw_os_error(errno as i32))
    }
}

/// Detach from the controlling terminal via a double fork with an
/// intervening `setsid`, then close the standard descriptors. The first
/// fork's parent returns `true` and must exit immediately; the
/// grandchild (the actual daemon) returns `false` and keeps running.
///
/// # Safety
/// Must be called before any threads are spawned: `fork` in a
/// multi-threaded process only duplicates the calling thread, which is
/// unsound if other threads hold locks the child will later need.
pub unsafe fn daemonize() -> Result<bool, LauncherError> {
    match fork()? {
        ForkResult::Parent { .. } => return Ok(true),
        ForkResult::Child => {}
    }
    setsid()?;
    match fork()? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }
    for fd in 0..=2 {
        let _ = close(fd);
    }
    Ok(false)
}

/// Owns the catalog-scoped shared-memory segment, command queue, and the
/// single-launcher guard for one catalog file.
pub struct Launcher {
    catalog_path: PathBuf,
    shm_path: PathBuf,
    shm: WorkerShm,
    queue: CommandQueue,
    _guard: LauncherGuard,
}

impl Launcher {
    /// Acquire the single-launcher guard for `catalog_path`, create or
    /// open its shared-memory segment and command queue, and install
    /// signal handlers. Returns `Ok(None)` if another launcher already
    /// owns this catalog.
    pub fn start(catalog_path: impl Into<PathBuf>, runtime_dir: impl AsRef<Path>) -> Result<Option<Self>, LauncherError> {
        let catalog_path = catalog_path.into();
        let runtime_dir = runtime_dir.as_ref();
        std::fs::create_dir_all(runtime_dir).map_err(LauncherError::Io)?;

        let guard_path = runtime_dir.join("launcher.pid");
        let Some(guard) = LauncherGuard::try_acquire(&guard_path)? else {
            return Ok(None);
        };

        let shm_path = runtime_dir.join("workers.shm");
        let shm = WorkerShm::create_or_open(&shm_path)?;
        let queue = CommandQueue::new(runtime_dir.join("commands.queue"));

        install_signal_handlers()?;

        Ok(Some(Self {
            catalog_path,
            shm_path,
            shm,
            queue,
            _guard: guard,
        }))
    }

    #[must_use]
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    #[must_use]
    pub fn shm_path(&self) -> &Path {
        &self.shm_path
    }

    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Reap any worker PIDs that have exited since the last check, freeing
    /// their slots (or child sub-slots). This is the only path that
    /// mutates a worker slot without being the worker itself.
    pub fn reap_dead_children(&mut self) -> Result<usize, ShmError> {
        if !CHILD_REAP_PENDING.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }
        let mut reaped = 0;
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                    if self.shm.reap(pid.as_raw())? {
                        reaped += 1;
                    }
                }
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        Ok(reaped)
    }

    /// Fork a worker to run `action`, recording it in the slot table under
    /// the worker's own pid. The parent returns immediately; it does not
    /// wait for the child (that happens via `SIGCHLD` + `reap_dead_children`).
    ///
    /// # Safety
    /// Same caveat as [`daemonize`]: only safe to call from a
    /// single-threaded launcher loop.
    pub unsafe fn spawn_worker(&mut self, action: &dyn WorkerAction) -> Result<i32, WorkerError> {
        match fork().map_err(WorkerError::ForkFailed)? {
            ForkResult::Parent { child } => Ok(child.as_raw()),
            ForkResult::Child => {
                let result = run_worker(&self.catalog_path, &self.shm_path, action);
                std::process::exit(i32::from(result.is_err()));
            }
        }
    }

    /// One turn of the launcher's single-threaded event loop: reap dead
    /// children, answer a pending status-refresh request, then try to pop
    /// and return the next queued command (or sleep briefly if idle).
    pub fn tick(&mut self) -> Result<LoopAction, LauncherError> {
        match shutdown_mode() {
            ShutdownMode::Smart => return Ok(LoopAction::ShutdownSmart),
            ShutdownMode::Emergency => return Ok(LoopAction::ShutdownEmergency),
            ShutdownMode::Running => {}
        }

        self.reap_dead_children()?;

        if STATUS_REFRESH_REQUESTED.swap(false, Ordering::SeqCst) {
            return Ok(LoopAction::RefreshStatus);
        }

        match self.queue.try_recv() {
            Ok(message) => Ok(LoopAction::Dispatch(message)),
            Err(QueueError::Empty) => {
                std::thread::sleep(Duration::from_millis(50));
                Ok(LoopAction::Idle)
            }
            Err(other) => Err(other.into()),
        }
    }
}

#[derive(Debug)]
pub enum LoopAction {
    Idle,
    Dispatch(Vec<u8>),
    RefreshStatus,
    ShutdownSmart,
    ShutdownEmergency,
}

impl Drop for Launcher {
    fn drop(&mut self) {
        info!("launcher for {} shutting down", self.catalog_path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_launcher_for_same_catalog_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let runtime_dir = dir.path().join("run");
        let catalog_path = dir.path().join("catalog.db");

        let first = Launcher::start(&catalog_path, &runtime_dir).unwrap();
        assert!(first.is_some());
        let second = Launcher::start(&catalog_path, &runtime_dir).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn idle_tick_reports_idle_when_queue_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let runtime_dir = dir.path().join("run");
        let catalog_path = dir.path().join("catalog.db");
        let mut launcher = Launcher::start(&catalog_path, &runtime_dir).unwrap().unwrap();
        assert!(matches!(launcher.tick().unwrap(), LoopAction::Idle));
    }
}
