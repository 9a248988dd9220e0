// src/messaging/connection.rs
//! Lifecycle of the one authenticated real-time channel per signed-in user.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use super::codec::{self, Packet};
use crate::app_log;
use crate::auth::SessionToken;
use crate::config::{ReconnectPolicy, SyncConfig};
use crate::error::SyncError;
use crate::types::events::{InboundEvent, OutboundEvent};

const OUTBOUND_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 256;

/// Both directions of an established channel. Dropping `outbound` closes it.
pub struct Link {
    pub outbound: mpsc::Sender<OutboundEvent>,
    pub inbound: mpsc::Receiver<InboundEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, token: &SessionToken) -> Result<Link>;
}

/// What the supervisor reports to the context. `generation` identifies the
/// supervisor that produced the event so stale reports can be dropped.
#[derive(Debug)]
pub enum LinkEvent {
    Up {
        generation: u64,
        outbound: mpsc::Sender<OutboundEvent>,
    },
    Inbound {
        generation: u64,
        event: InboundEvent,
    },
    Down {
        generation: u64,
    },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Up { generation, .. }
            | Self::Inbound { generation, .. }
            | Self::Down { generation } => *generation,
        }
    }
}

/// Owns the supervisor task for the current session token.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    events: mpsc::Sender<LinkEvent>,
    generation: u64,
    active: Option<(SessionToken, JoinHandle<()>)>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        Self {
            connector,
            policy,
            events,
            generation: 0,
            active: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Bring the channel in line with the session. Returns `true` when the
    /// previous channel (if any) was replaced or torn down.
    pub fn sync_session(&mut self, token: Option<SessionToken>) -> bool {
        match token {
            None => {
                let had_channel = self.active.is_some();
                self.teardown();
                had_channel
            }
            Some(token) => {
                if matches!(&self.active, Some((current, _)) if *current == token) {
                    return false;
                }
                let replaced = self.active.is_some();
                self.teardown();
                self.start(token);
                replaced
            }
        }
    }

    fn start(&mut self, token: SessionToken) {
        self.generation += 1;
        app_log!(info, "Starting channel supervisor #{}", self.generation);

        let supervisor = tokio::spawn(supervise(
            self.connector.clone(),
            token.clone(),
            self.policy.clone(),
            self.events.clone(),
            self.generation,
        ));
        self.active = Some((token, supervisor));
    }

    pub fn teardown(&mut self) {
        if let Some((_, supervisor)) = self.active.take() {
            app_log!(info, "Tearing down channel supervisor #{}", self.generation);
            supervisor.abort();
            // Anything the old supervisor already queued is now stale.
            self.generation += 1;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn supervise(
    connector: Arc<dyn Connector>,
    token: SessionToken,
    policy: ReconnectPolicy,
    events: mpsc::Sender<LinkEvent>,
    generation: u64,
) {
    let mut failures = 0u32;

    loop {
        match connector.connect(&token).await {
            Ok(Link {
                outbound,
                mut inbound,
            }) => {
                failures = 0;
                app_log!(info, "Channel established");
                if events
                    .send(LinkEvent::Up {
                        generation,
                        outbound,
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                while let Some(event) = inbound.recv().await {
                    if events
                        .send(LinkEvent::Inbound { generation, event })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }

                app_log!(warn, "Channel closed by peer");
                if events.send(LinkEvent::Down { generation }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                app_log!(warn, "Failed to establish channel: {:#}", e);
            }
        }

        failures += 1;
        if policy.exhausted(failures) {
            app_log!(warn, "Giving up on the channel after {} attempt(s)", failures);
            return;
        }

        let delay = policy.delay_for(failures - 1);
        app_log!(debug, "Reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

/// WebSocket transport speaking the Socket.IO framing of the portal backend.
pub struct SocketIoConnector {
    endpoint: Url,
    connect_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;

        let scheme = match endpoint.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => anyhow::bail!("Unsupported URL scheme for the channel: {}", other),
        };
        endpoint
            .set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot switch {} to {}", endpoint, scheme))?;
        endpoint.set_path(&config.socket_path);
        endpoint.query_pairs_mut().clear().extend_pairs(codec::ENGINE_QUERY);

        Ok(Self {
            endpoint,
            connect_timeout: config.connect_timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn connect(&self, token: &SessionToken) -> Result<Link> {
        app_log!(debug, "Connecting to {}", self.endpoint);

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.endpoint.as_str()))
            .await
            .map_err(|_| SyncError::Connection("connect timed out".to_string()))?
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let handshake = match next_packet(&mut read).await? {
            Packet::Open(handshake) => {
                app_log!(debug, "Engine session {} (ping every {}ms)", handshake.sid, handshake.ping_interval);
                handshake
            }
            other => {
                return Err(SyncError::Protocol(format!("expected open packet, got {:?}", other)).into())
            }
        };
        let silence_limit = handshake.silence_limit();

        write
            .send(Message::text(codec::connect_with_token(token.as_str())))
            .await
            .context("Failed to send connect packet")?;

        loop {
            match next_packet(&mut read).await? {
                Packet::Connect(_) => break,
                Packet::ConnectError(reason) => {
                    return Err(SyncError::ConnectRejected(reason.to_string()).into())
                }
                Packet::Ping => write
                    .send(Message::text(codec::encode(&Packet::Pong)))
                    .await
                    .context("Failed to answer ping")?,
                _ => continue,
            }
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundEvent>(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_BUFFER);
        let (pong_tx, mut pong_rx) = mpsc::channel::<String>(4);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = outbound_rx.recv() => match event {
                        Some(event) => {
                            if let Err(e) = write.send(Message::text(codec::encode_event(&event))).await {
                                app_log!(warn, "Failed to emit {}: {}", event.name(), e);
                                break;
                            }
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    Some(frame) = pong_rx.recv() => {
                        if write.send(Message::text(frame)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            app_log!(debug, "Channel writer stopped");
        });

        tokio::spawn(async move {
            loop {
                let next = match silence_limit {
                    Some(limit) => match tokio::time::timeout(limit, read.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            app_log!(warn, "No traffic for {:?}, treating channel as lost", limit);
                            break;
                        }
                    },
                    None => read.next().await,
                };
                let Some(message) = next else {
                    break;
                };
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        app_log!(warn, "Channel read error: {}", e);
                        break;
                    }
                };

                match codec::decode(text.as_str()) {
                    Ok(Packet::Ping) => {
                        if pong_tx.send(codec::encode(&Packet::Pong)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Packet::Event { name, payload }) => {
                        match InboundEvent::from_parts(&name, payload) {
                            Ok(Some(event)) => {
                                if inbound_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => app_log!(trace, "Ignoring event {}", name),
                            Err(e) => app_log!(warn, "Dropping event: {}", e),
                        }
                    }
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => break,
                    Ok(_) => {}
                    Err(e) => app_log!(warn, "Dropping frame: {}", e),
                }
            }
            app_log!(debug, "Channel reader stopped");
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn next_packet<S>(read: &mut S) -> Result<Packet>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = read
            .next()
            .await
            .ok_or_else(|| SyncError::Connection("closed during handshake".to_string()))?
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        match message {
            Message::Text(text) => return Ok(codec::decode(text.as_str())?),
            Message::Close(_) => {
                return Err(SyncError::Connection("closed during handshake".to_string()).into())
            }
            _ => continue,
        }
    }
}
