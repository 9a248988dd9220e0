//! Real-time unread-count and typing-indicator synchronization for the job
//! portal's messaging views.
//!
//! A [`MessageContextHandle`] owns one authenticated channel per signed-in
//! user, keeps per-peer unread counters and typing flags, and reconciles
//! inbound events with the conversation the host currently has open.

pub mod auth;
pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod messaging;
pub mod types;
pub mod utils;

pub use auth::{SessionStore, SessionToken};
pub use config::{ReconnectPolicy, SyncConfig};
pub use error::SyncError;
pub use messaging::{spawn_context, MessageContextHandle, MessageSnapshot};
pub use types::events::{InboundEvent, OutboundEvent, PeerId, TypingUsers, UnreadCounts};

/// Leveled logging shorthand used across the crate: `app_log!(info, "...", args)`.
#[macro_export]
macro_rules! app_log {
    (trace, $($arg:tt)+) => { ::tracing::trace!($($arg)+) };
    (debug, $($arg:tt)+) => { ::tracing::debug!($($arg)+) };
    (info, $($arg:tt)+) => { ::tracing::info!($($arg)+) };
    (warn, $($arg:tt)+) => { ::tracing::warn!($($arg)+) };
    (error, $($arg:tt)+) => { ::tracing::error!($($arg)+) };
}
