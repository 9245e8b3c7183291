use thiserror::Error;

/// Errors produced by the store layer.
///
/// The first four variants are the domain taxonomy callers act on; the rest
/// are storage failures and surface as internal errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or missing input. Detected before any write.
    #[error("{0}")]
    Invalid(String),

    /// A referenced user, edge, group or membership does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate edge or membership.
    #[error("{0}")]
    Conflict(String),

    /// The acting user's role does not allow the operation.
    #[error("{0}")]
    Forbidden(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub(crate) fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
