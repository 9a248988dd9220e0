// src/messaging/typing.rs
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::events::{PeerId, TypingUsers};

/// Peer -> typing flag, driven by inbound events only.
///
/// With a TTL set, a `true` flag that is not refreshed within the TTL is
/// flipped back to `false` by [`TypingIndicatorStore::expire`].
#[derive(Debug, Clone, Default)]
pub struct TypingIndicatorStore {
    flags: TypingUsers,
    started: HashMap<PeerId, Instant>,
    ttl: Option<Duration>,
}

impl TypingIndicatorStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn flags(&self) -> &TypingUsers {
        &self.flags
    }

    pub fn is_typing(&self, peer: &str) -> bool {
        self.flags.get(peer).copied().unwrap_or(false)
    }

    pub fn on_inbound_typing(&mut self, peer: &str, is_typing: bool, now: Instant) {
        self.flags.insert(peer.to_string(), is_typing);
        if is_typing {
            self.started.insert(peer.to_string(), now);
        } else {
            self.started.remove(peer);
        }
    }

    /// Clear stale `true` flags; returns the peers that were flipped.
    pub fn expire(&mut self, now: Instant) -> Vec<PeerId> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };

        let stale: Vec<PeerId> = self
            .started
            .iter()
            .filter(|(_, since)| now.saturating_duration_since(**since) >= ttl)
            .map(|(peer, _)| peer.clone())
            .collect();

        for peer in &stale {
            self.started.remove(peer);
            self.flags.insert(peer.clone(), false);
        }
        stale
    }

    pub fn clear(&mut self) {
        self.flags.clear();
        self.started.clear();
    }
}
