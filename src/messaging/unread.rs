// src/messaging/unread.rs
use anyhow::Result;

use super::reconciler::{CounterAction, ViewAwareness};
use crate::app_log;
use crate::types::events::UnreadCounts;

/// Peer -> unread counter, seeded from the REST snapshot.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounterStore {
    counts: UnreadCounts,
    loading: bool,
}

impl UnreadCounterStore {
    pub fn counts(&self) -> &UnreadCounts {
        &self.counts
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn get(&self, peer: &str) -> u32 {
        self.counts.get(peer).copied().unwrap_or(0)
    }

    pub fn begin_fetch(&mut self) {
        self.loading = true;
    }

    /// Replace the map with the snapshot, or clear it when the fetch failed.
    pub fn finish_fetch(&mut self, result: Result<UnreadCounts>) {
        match result {
            Ok(counts) => {
                app_log!(debug, "Loaded unread counts for {} peer(s)", counts.len());
                self.counts = counts;
            }
            Err(e) => {
                app_log!(warn, "Failed to fetch unread counts: {:#}", e);
                self.counts.clear();
            }
        }
        self.loading = false;
    }

    /// Apply an `update-unread-count` event and return the peer's new count.
    pub fn on_inbound_message(&mut self, peer: &str, increment: bool, view: &ViewAwareness) -> u32 {
        let next = match view.decide(peer, increment) {
            CounterAction::Increment => self.get(peer).saturating_add(1),
            CounterAction::Reset => 0,
        };
        self.counts.insert(peer.to_string(), next);
        next
    }

    pub fn mark_read(&mut self, peer: &str) {
        self.counts.insert(peer.to_string(), 0);
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(pairs: &[(&str, u32)]) -> UnreadCounterStore {
        let mut store = UnreadCounterStore::default();
        store.begin_fetch();
        store.finish_fetch(Ok(pairs
            .iter()
            .map(|(peer, count)| (peer.to_string(), *count))
            .collect()));
        store
    }

    #[test]
    fn test_increment_for_closed_conversation() {
        let mut store = seeded(&[("u1", 2)]);
        let view = ViewAwareness::default();

        assert_eq!(store.on_inbound_message("u1", true, &view), 3);
        assert_eq!(store.on_inbound_message("u3", true, &view), 1);
        assert_eq!(store.get("u3"), 1);
    }

    #[test]
    fn test_open_conversation_resets_regardless_of_flag() {
        let mut store = seeded(&[("u1", 5)]);
        let mut view = ViewAwareness::default();
        view.set_active(Some("u1"));

        assert_eq!(store.on_inbound_message("u1", true, &view), 0);
        store.counts.insert("u1".to_string(), 4);
        assert_eq!(store.on_inbound_message("u1", false, &view), 0);
    }

    #[test]
    fn test_increment_false_resets() {
        let mut store = seeded(&[("u1", 7)]);
        assert_eq!(store.on_inbound_message("u1", false, &ViewAwareness::default()), 0);
    }

    #[test]
    fn test_failed_fetch_clears_and_stops_loading() {
        let mut store = seeded(&[("u1", 7)]);
        store.begin_fetch();
        assert!(store.loading());

        store.finish_fetch(Err(anyhow::anyhow!("boom")));
        assert!(store.counts().is_empty());
        assert!(!store.loading());
    }

    #[test]
    fn test_mark_read() {
        let mut store = seeded(&[("u1", 3), ("u2", 1)]);
        store.mark_read("u1");
        assert_eq!(store.get("u1"), 0);
        assert_eq!(store.get("u2"), 1);
    }

    #[test]
    fn test_counter_saturates() {
        let mut store = seeded(&[("u1", u32::MAX)]);
        assert_eq!(store.on_inbound_message("u1", true, &ViewAwareness::default()), u32::MAX);
    }
}
