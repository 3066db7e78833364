//! The crate-wide error type: every operation ultimately reduces to this
//! enum, ordered most-specific-first per the error kinds this crate
//! recognises (schema/catalog, filesystem, streaming, worker, launcher,
//! shared memory, retention, command dispatch), with a generic fallback
//! last.

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    CatalogIssue(#[from] crate::catalog::CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ArchiveIssue(#[from] crate::archive::ArchiveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    StreamingFailure(#[from] crate::stream::StreamError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    WorkerFailure(#[from] crate::supervisor::error::WorkerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    LauncherFailure(#[from] crate::supervisor::error::LauncherError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    SHMFailure(#[from] crate::supervisor::error::ShmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    RetentionFailure(#[from] crate::catalog::retention::RetentionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ConfigIssue(#[from] crate::config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CommandIssue(#[from] crate::command::CommandError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_error_converts_via_from() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_err = crate::catalog::Catalog::open(dir.path().join("catalog.db"))
            .unwrap()
            .drop_archive("nope")
            .unwrap_err();
        let err: Error = catalog_err.into();
        assert!(matches!(err, Error::CatalogIssue(_)));
    }
}
