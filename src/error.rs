// src/error.rs
use thiserror::Error;

/// Failure classes of the synchronization core.
///
/// Every one of these is absorbed at the context boundary; they surface only
/// in logs and in the return values of the lower-level clients.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no active session token")]
    MissingSession,

    #[error("channel could not be established: {0}")]
    Connection(String),

    #[error("server rejected the channel: {0}")]
    ConnectRejected(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed frame: {0}")]
    Protocol(String),
}
