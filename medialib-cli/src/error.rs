use medialib_db::{DbError, SettingsError};
use medialib_scan::ScanError;
use thiserror::Error;

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed
    #[error("{0}")]
    Database(#[from] DbError),

    /// Reconciliation failed
    #[error("{0}")]
    Scan(#[from] ScanError),

    /// Settings file could not be read or written
    #[error("{0}")]
    Settings(#[from] SettingsError),

    /// Bad command-line input
    #[error("{0}")]
    Usage(String),

    /// A check found problems
    #[error("Check failed: {0}")]
    Check(String),
}

impl CliError {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub(crate) fn check(msg: impl Into<String>) -> Self {
        Self::Check(msg.into())
    }

    /// The catalog cannot be used until it is repaired or replaced.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            Self::Database(e) | Self::Scan(ScanError::Db(e)) => e.is_fatal(),
            _ => false,
        }
    }
}
