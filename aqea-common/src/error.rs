//! Common error types for the AQEA extraction services

use thiserror::Error;

/// Common result type for AQEA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared by the master, the workers, and the storage layer.
///
/// Soft per-record failures (`Conversion`, `AddressSpaceExhausted`,
/// `UpstreamFetch` after retries) are counted and reported, never fatal.
/// `Config` and `UnsupportedLanguage` terminate the affected process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Address space exhausted for 0x{aa:02X}:{qq:02X}:{ee:02X}")]
    AddressSpaceExhausted { aa: u8, qq: u8, ee: u8 },

    #[error("Transient store error: {0}")]
    StoreTransient(String),

    #[error("Persistent store error: {0}")]
    StorePersistent(String),

    #[error("Coordination conflict: {0}")]
    CoordinationConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::StoreTransient(_) | Error::UpstreamFetch(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }
}
