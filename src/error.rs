//! Error types for the relay, one enum per domain.

use thiserror::Error;

/// Errors surfaced by the relay path (lookup, resolution, streaming).
///
/// Every variant maps to a client-facing HTTP status at the server boundary;
/// none of them should ever take the process down.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The file id is not present in the metadata store.
    #[error("file {id} not found")]
    NotFound { id: String },

    /// The requested range starts beyond the last byte of a known-size object.
    #[error("requested range not satisfiable (object is {size} bytes)")]
    RangeNotSatisfiable { size: u64 },

    /// The platform rejected the locator token (unknown, revoked or expired).
    #[error("file locator rejected by platform: {reason}")]
    LocatorInvalid { reason: String },

    /// Resolution failed after the retry budget (timeouts, transport errors).
    #[error("failed to resolve file location: {reason}")]
    Resolution { reason: String },

    /// The remote byte fetch failed before any payload was written.
    #[error("remote fetch failed: {reason}")]
    RemoteFetch { reason: String },

    /// Metadata store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the metadata store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("migration error: {0}")]
    Migration(String),
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}

/// Errors loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {name}")]
    MissingVar { name: &'static str },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}
