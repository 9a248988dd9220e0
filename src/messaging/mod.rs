// src/messaging/mod.rs
//! Unread-count and typing-indicator synchronization.

pub mod codec;
pub mod connection;
pub mod context;
pub mod reconciler;
pub mod service_client;
pub mod typing;
pub mod unread;

use anyhow::Result;
use std::sync::Arc;

pub use connection::{ConnectionManager, Connector, Link, LinkEvent, SocketIoConnector};
pub use context::{spawn_context, MessageContextHandle, MessageSnapshot};
pub use reconciler::{conversation_from_path, CounterAction, ViewAwareness};
pub use service_client::{HttpMessagesApi, MessagesApi};
pub use typing::TypingIndicatorStore;
pub use unread::UnreadCounterStore;

use crate::auth::SessionStore;
use crate::config::SyncConfig;

/// Start a context wired to the portal backend over HTTP and WebSocket.
pub fn connect(config: &SyncConfig, session: SessionStore) -> Result<MessageContextHandle> {
    let api = Arc::new(HttpMessagesApi::new(config)?);
    let connector = Arc::new(SocketIoConnector::new(config)?);
    Ok(spawn_context(config, session, api, connector))
}
