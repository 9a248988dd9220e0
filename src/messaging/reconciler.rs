// src/messaging/reconciler.rs
//! Decides whether an inbound message concerns the conversation the host has
//! open right now.

use crate::types::events::PeerId;
use crate::utils::normalize_peer_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    Increment,
    Reset,
}

#[derive(Debug, Clone, Default)]
pub struct ViewAwareness {
    open: Option<PeerId>,
}

impl ViewAwareness {
    /// Explicit "currently viewing" signal from the host's routing layer.
    pub fn set_active(&mut self, peer: Option<&str>) {
        self.open = peer.and_then(normalize_peer_id);
    }

    /// Adapter for hosts that only know their navigation path.
    pub fn set_location(&mut self, path: &str) {
        self.open = conversation_from_path(path);
    }

    pub fn open_conversation(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn is_open(&self, peer: &str) -> bool {
        self.open.as_deref() == Some(peer)
    }

    pub fn decide(&self, peer: &str, increment: bool) -> CounterAction {
        if self.is_open(peer) || !increment {
            CounterAction::Reset
        } else {
            CounterAction::Increment
        }
    }
}

/// Last non-empty segment of a navigation path, ignoring query and fragment.
pub fn conversation_from_path(path: &str) -> Option<PeerId> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .and_then(normalize_peer_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_from_path() {
        assert_eq!(
            conversation_from_path("/employer/messages/u1"),
            Some("u1".to_string())
        );
        assert_eq!(
            conversation_from_path("/messages/u2/?tab=all#bottom"),
            Some("u2".to_string())
        );
        assert_eq!(conversation_from_path("/"), None);
        assert_eq!(conversation_from_path(""), None);
    }

    #[test]
    fn test_decide() {
        let mut view = ViewAwareness::default();
        view.set_active(Some("u2"));

        assert_eq!(view.decide("u1", true), CounterAction::Increment);
        assert_eq!(view.decide("u1", false), CounterAction::Reset);
        assert_eq!(view.decide("u2", true), CounterAction::Reset);
        assert_eq!(view.decide("u2", false), CounterAction::Reset);
    }

    #[test]
    fn test_location_and_active_override_each_other() {
        let mut view = ViewAwareness::default();
        view.set_location("/employer/messages/u5");
        assert!(view.is_open("u5"));

        view.set_active(None);
        assert_eq!(view.open_conversation(), None);

        view.set_active(Some("  "));
        assert_eq!(view.open_conversation(), None);
    }
}
