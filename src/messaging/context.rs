// src/messaging/context.rs
//! The message context: one actor task that owns the channel, both stores and
//! the view state, and a cloneable handle through which hosts read snapshots
//! and trigger actions.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::connection::{ConnectionManager, Connector, LinkEvent};
use super::reconciler::ViewAwareness;
use super::service_client::MessagesApi;
use super::typing::TypingIndicatorStore;
use super::unread::UnreadCounterStore;
use crate::app_log;
use crate::auth::SessionStore;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::types::events::{InboundEvent, OutboundEvent, PeerId, TypingUsers, UnreadCounts};
use crate::utils::normalize_peer_id;

const COMMAND_BUFFER: usize = 64;
const LINK_BUFFER: usize = 256;

/// What consumers read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub unread_counts: UnreadCounts,
    pub typing_users: TypingUsers,
    pub unread_loading: bool,
    pub connected: bool,
}

impl MessageSnapshot {
    pub fn unread_for(&self, peer: &str) -> u32 {
        self.unread_counts.get(peer).copied().unwrap_or(0)
    }

    pub fn is_typing(&self, peer: &str) -> bool {
        self.typing_users.get(peer).copied().unwrap_or(false)
    }

    /// Number of peers with at least one unread message.
    pub fn peers_with_unread(&self) -> usize {
        self.unread_counts.values().filter(|count| **count > 0).count()
    }
}

#[derive(Debug)]
enum Command {
    JoinUserRoom(PeerId),
    MarkRead(PeerId),
    SendTyping { recipient: PeerId, sender: PeerId },
    StopTyping(PeerId),
    SetActive(Option<PeerId>),
    SetLocation(String),
    RefreshUnread,
    Shutdown,
}

struct Envelope {
    command: Command,
    done: oneshot::Sender<()>,
}

enum Internal {
    Fetched {
        establishment: u64,
        result: anyhow::Result<UnreadCounts>,
    },
    PersistFailed {
        peer: PeerId,
    },
}

/// Handle to a running message context. Cheap to clone; the context stops
/// when the last handle is dropped or [`MessageContextHandle::shutdown`] runs.
#[derive(Clone)]
pub struct MessageContextHandle {
    commands: mpsc::Sender<Envelope>,
    state: watch::Receiver<MessageSnapshot>,
}

impl MessageContextHandle {
    pub fn snapshot(&self) -> MessageSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MessageSnapshot> {
        self.state.clone()
    }

    /// Ask the server to route this user's events to our channel.
    pub async fn join_user_room(&self, user_id: &str) {
        if let Some(user_id) = normalize_peer_id(user_id) {
            self.dispatch(Command::JoinUserRoom(user_id)).await;
        }
    }

    /// Zero the counter locally, then persist and broadcast the read state.
    /// Returns once the local reset is visible in [`Self::snapshot`].
    pub async fn mark_messages_read(&self, peer: &str) {
        if let Some(peer) = normalize_peer_id(peer) {
            self.dispatch(Command::MarkRead(peer)).await;
        }
    }

    pub async fn send_typing_indicator(&self, recipient: &str, sender: &str) {
        self.dispatch(Command::SendTyping {
            recipient: recipient.to_string(),
            sender: sender.to_string(),
        })
        .await;
    }

    pub async fn send_stop_typing(&self, recipient: &str) {
        self.dispatch(Command::StopTyping(recipient.to_string())).await;
    }

    pub async fn set_active_conversation(&self, peer: Option<&str>) {
        self.dispatch(Command::SetActive(peer.map(str::to_string)))
            .await;
    }

    pub async fn set_location(&self, path: &str) {
        self.dispatch(Command::SetLocation(path.to_string())).await;
    }

    /// Re-read the authoritative unread map.
    pub async fn refresh_unread(&self) {
        self.dispatch(Command::RefreshUnread).await;
    }

    pub async fn shutdown(&self) {
        self.dispatch(Command::Shutdown).await;
    }

    async fn dispatch(&self, command: Command) {
        let (done, ack) = oneshot::channel();
        if let Err(e) = self.commands.send(Envelope { command, done }).await {
            app_log!(debug, "Message context closed, dropping {:?}", e.0.command);
            return;
        }
        let _ = ack.await;
    }
}

/// Start a message context on the current tokio runtime.
pub fn spawn_context(
    config: &SyncConfig,
    session: SessionStore,
    api: Arc<dyn MessagesApi>,
    connector: Arc<dyn Connector>,
) -> MessageContextHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (link_tx, link_rx) = mpsc::channel(LINK_BUFFER);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(MessageSnapshot::default());

    let context = MessageContext {
        session,
        api,
        connection: ConnectionManager::new(connector, config.reconnect.clone(), link_tx),
        link_rx,
        internal_tx,
        internal_rx,
        outbound: None,
        establishment: 0,
        unread: UnreadCounterStore::default(),
        typing: TypingIndicatorStore::new(config.typing_ttl),
        view: ViewAwareness::default(),
        state_tx,
    };
    tokio::spawn(context.run(commands_rx, config.typing_sweep_interval));

    MessageContextHandle {
        commands: commands_tx,
        state: state_rx,
    }
}

struct MessageContext {
    session: SessionStore,
    api: Arc<dyn MessagesApi>,
    connection: ConnectionManager,
    link_rx: mpsc::Receiver<LinkEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    outbound: Option<mpsc::Sender<OutboundEvent>>,
    /// Bumped on every channel establishment; tags in-flight fetches.
    establishment: u64,
    unread: UnreadCounterStore,
    typing: TypingIndicatorStore,
    view: ViewAwareness,
    state_tx: watch::Sender<MessageSnapshot>,
}

impl MessageContext {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Envelope>,
        sweep_every: std::time::Duration,
    ) {
        let mut session_rx = self.session.subscribe();
        self.on_session_change();

        let mut sweep = tokio::time::interval(sweep_every.max(std::time::Duration::from_millis(10)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                envelope = commands.recv() => {
                    let Some(Envelope { command, done }) = envelope else {
                        break;
                    };
                    let stop = matches!(command, Command::Shutdown);
                    self.handle_command(command);
                    let _ = done.send(());
                    if stop {
                        break;
                    }
                }
                changed = session_rx.changed() => {
                    if changed.is_ok() {
                        self.on_session_change();
                    }
                }
                Some(event) = self.link_rx.recv() => self.handle_link_event(event),
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.connection.teardown();
        self.outbound = None;
        self.establishment += 1;
        self.publish_with(|snapshot| snapshot.connected = false);
        app_log!(info, "Message context stopped");
    }

    fn on_session_change(&mut self) {
        let token = self.session.current();
        let signed_in = token.is_some();
        if self.connection.sync_session(token) {
            self.outbound = None;
            // In-flight fetches belong to the channel just dropped.
            self.establishment += 1;
            // Counters belong to the previous user.
            self.unread.clear();
            self.typing.clear();
        }
        if !signed_in {
            app_log!(debug, "No session token, channel idle");
        }
        self.publish();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::JoinUserRoom(user_id) => self.emit(OutboundEvent::JoinUser { user_id }),
            Command::MarkRead(peer) => self.mark_read(peer),
            Command::SendTyping { recipient, sender } => self.emit(OutboundEvent::Typing {
                recipient_id: recipient,
                sender_id: sender,
            }),
            Command::StopTyping(recipient) => self.emit(OutboundEvent::StopTyping {
                recipient_id: recipient,
            }),
            Command::SetActive(peer) => self.view.set_active(peer.as_deref()),
            Command::SetLocation(path) => self.view.set_location(&path),
            Command::RefreshUnread => self.fetch_unread(),
            Command::Shutdown => {}
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        if event.generation() != self.connection.generation() {
            app_log!(trace, "Dropping event from superseded channel");
            return;
        }

        match event {
            LinkEvent::Up { outbound, .. } => {
                self.outbound = Some(outbound);
                self.establishment += 1;
                self.fetch_unread();
            }
            LinkEvent::Inbound { event, .. } => self.handle_inbound(event),
            LinkEvent::Down { .. } => {
                self.outbound = None;
                self.publish();
            }
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::UnreadUpdate(update) => {
                let Some(peer) = update.sender_id.as_deref().and_then(normalize_peer_id) else {
                    return;
                };
                let count = self.unread.on_inbound_message(&peer, update.increment, &self.view);
                app_log!(trace, "Unread for {} is now {}", peer, count);
            }
            InboundEvent::UserTyping(update) => {
                let Some(peer) = update.user_id.as_deref().and_then(normalize_peer_id) else {
                    return;
                };
                self.typing.on_inbound_typing(&peer, update.is_typing, Instant::now());
            }
        }
        self.publish();
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Fetched {
                establishment,
                result,
            } => {
                if establishment != self.establishment {
                    app_log!(trace, "Discarding unread counts from an earlier channel");
                    return;
                }
                self.unread.finish_fetch(result);
                self.publish();
            }
            Internal::PersistFailed { peer } => {
                app_log!(warn, "Read state for {} not persisted, re-fetching counts", peer);
                self.fetch_unread();
            }
        }
    }

    fn fetch_unread(&mut self) {
        let Some(token) = self.session.current() else {
            self.unread.finish_fetch(Err(SyncError::MissingSession.into()));
            self.publish();
            return;
        };

        self.unread.begin_fetch();
        self.publish();

        let api = self.api.clone();
        let internal = self.internal_tx.clone();
        let establishment = self.establishment;
        tokio::spawn(async move {
            let result = api.unread_counts(&token).await;
            let _ = internal.send(Internal::Fetched {
                establishment,
                result,
            });
        });
    }

    fn mark_read(&mut self, peer: PeerId) {
        self.unread.mark_read(&peer);
        self.publish();

        self.emit(OutboundEvent::MessagesRead {
            user_id: peer.clone(),
        });

        let Some(token) = self.session.current() else {
            app_log!(warn, "Cannot persist read state for {} without a session", peer);
            return;
        };
        let api = self.api.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            match api.mark_read(&token, &peer).await {
                Ok(()) => app_log!(debug, "Read state for {} persisted", peer),
                Err(e) => {
                    app_log!(error, "Failed to mark messages read for {}: {:#}", peer, e);
                    let _ = internal.send(Internal::PersistFailed { peer });
                }
            }
        });
    }

    fn emit(&mut self, event: OutboundEvent) {
        let Some(outbound) = &self.outbound else {
            app_log!(trace, "No channel, not emitting {}", event.name());
            return;
        };
        match outbound.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                app_log!(warn, "Outbound buffer full, dropping {}", event.name())
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                app_log!(debug, "Channel gone, dropping {}", event.name());
                self.outbound = None;
                self.publish();
            }
        }
    }

    fn sweep(&mut self) {
        if self.connection.is_active() && self.session.current().is_none() {
            app_log!(info, "Session expired, closing channel");
            self.on_session_change();
        }

        let expired = self.typing.expire(Instant::now());
        if !expired.is_empty() {
            app_log!(debug, "Typing indicator expired for {:?}", expired);
            self.publish();
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(MessageSnapshot {
            unread_counts: self.unread.counts().clone(),
            typing_users: self.typing.flags().clone(),
            unread_loading: self.unread.loading(),
            connected: self.outbound.is_some(),
        });
    }

    fn publish_with(&self, edit: impl FnOnce(&mut MessageSnapshot)) {
        self.state_tx.send_modify(edit);
    }
}
