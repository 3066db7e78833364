#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ShmError {
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("flock error: {0}")]
    Flock(#[from] nix::errno::Errno),

    #[error("worker shared-memory segment at {0} must already exist for a worker to attach")]
    SegmentMissing(std::path::PathBuf),

    #[error("no free worker slot available (capacity {0})")]
    NoFreeSlot(usize),

    #[error("no free child sub-slot in slot {0} (capacity {1})")]
    NoFreeChildSlot(usize, usize),

    #[error("slot {0} is not allocated")]
    SlotNotAllocated(usize),
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum LauncherError {
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a launcher is already running for this catalog")]
    #[diagnostic(help("only one launcher per catalog is permitted; stop the running one first"))]
    AlreadyRunning,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] crate::catalog::CatalogError),
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum QueueError {
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message exceeds the {0}-byte transport limit")]
    MessageTooLarge(usize),

    #[error("queue is full (capacity {0} messages)")]
    QueueFull(usize),

    #[error("queue is empty")]
    Empty,
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum WorkerError {
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] crate::catalog::CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Archive(#[from] crate::archive::ArchiveError),

    #[error("failed to fork worker process")]
    ForkFailed(#[source] nix::Error),
}
