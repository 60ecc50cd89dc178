//! Error taxonomy shared by every catalog operation.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A caller-supplied path, id or value was rejected before touching the database.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{entity} not found: '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("Failed to open database: {0}")]
    Connect(#[source] rusqlite::Error),

    #[error("Failed to close database: {0}")]
    Disconnect(#[source] rusqlite::Error),

    /// The database file failed an integrity check and should be rebuilt.
    #[error("Database is corrupt: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Internal(#[source] rusqlite::Error),

    #[error("SQLite ran out of memory")]
    OutOfMemory,

    #[error("Database stayed locked after {attempts} attempts")]
    LockTimeout { attempts: u32 },

    /// Upgrading to `version` failed; the catalog is unusable until a retry succeeds.
    #[error("Migration to schema version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True when the catalog itself is unusable, as opposed to a single
    /// operation having failed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt(_) | Self::Migration { .. })
    }

    /// True for SQLITE_BUSY / SQLITE_LOCKED, the conditions the busy policy retries.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Internal(e) => is_busy_error(e),
            _ => false,
        }
    }
}

pub(crate) fn is_busy_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
                Self::Corrupt(err.to_string())
            }
            Some(ErrorCode::OutOfMemory) => Self::OutOfMemory,
            _ => Self::Internal(err),
        }
    }
}

pub type Result<T, E = DbError> = std::result::Result<T, E>;
