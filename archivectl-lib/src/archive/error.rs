use std::path::PathBuf;

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ArchiveError {
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("archive signature file missing at {0}")]
    #[diagnostic(help("run VERIFY ARCHIVE to (re)write PG_BACKUP_CTL_INFO"))]
    SignatureMissing(PathBuf),

    #[error("archive signature file at {0} is not well-formed")]
    SignatureMalformed(PathBuf),

    #[error("{0:?} is not a recognised WAL segment, partial segment, or history filename")]
    InvalidSegmentFilename(String),

    #[error("gzip trailer in {0:?} is truncated; need at least 8 bytes")]
    GzipTrailerTruncated(PathBuf),

    #[error("lseek is not supported on a piped-process file")]
    SeekUnsupportedOnPipe,

    #[error("copy manager: {0}")]
    Copy(String),
}
