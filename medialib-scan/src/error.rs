use medialib_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The observed path is not covered by the session's scope.
    #[error("'{path}' is outside the scan scope {scope}")]
    OutOfScope { path: String, scope: String },

    #[error("storage '{0}' is detached; remount it before scanning")]
    Detached(String),

    /// A queue failed to commit, so the sweep was not run.
    #[error("flush of {kind} queue failed, sweep skipped: {source}")]
    FlushFailed {
        kind: medialib_db::BatchKind,
        #[source]
        source: DbError,
    },
}

impl From<rusqlite::Error> for ScanError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.into())
    }
}
