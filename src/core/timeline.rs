//! Per-conversation message timelines with reconciliation semantics.
//!
//! Three async paths race into a timeline: the optimistic send, its REST
//! confirmation, and the realtime push of the same logical message. There is
//! no locking; idempotency by final (server) id is the correctness mechanism.
//! Ordering invariant: confirmed entries ascend by `created_at` (ties keep
//! arrival order); a local placeholder pins its insertion position until it is
//! confirmed or removed, so the sender sees immediate feedback even if the
//! server clock is marginally earlier.

use std::collections::HashMap;

use crate::state::{is_placeholder_id, Message, MessageDeliveryState};

#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Replace with REST history. Local placeholders (pending or failed) are
    /// carried over so a send racing with a reload is not dropped.
    pub fn replace(&mut self, mut history: Vec<Message>) {
        let kept: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| is_placeholder_id(&m.id))
            .collect();
        history.sort_by_key(|m| m.created_at);
        history.dedup_by(|a, b| a.id == b.id);
        self.messages = history;
        for m in kept {
            self.messages.push(m);
        }
    }

    /// Append a pending placeholder; immediately visible to the caller.
    pub fn insert_optimistic(&mut self, message: Message) {
        debug_assert!(is_placeholder_id(&message.id));
        self.messages.push(message);
    }

    /// Insert a server message at its sorted position among server entries.
    /// Placeholders are transparent to the scan: they neither block the
    /// position nor move relative to each other.
    fn insert_sorted(&mut self, message: Message) {
        let mut insert_at = 0;
        for (i, m) in self.messages.iter().enumerate() {
            if !is_placeholder_id(&m.id) && m.created_at <= message.created_at {
                insert_at = i + 1;
            }
        }
        self.messages.insert(insert_at, message);
    }

    /// Collapse a placeholder into its server-confirmed record. If a pushed
    /// copy of the same server id already landed, this merges (drops the
    /// placeholder) instead of appending a duplicate.
    pub fn confirm(&mut self, placeholder_id: &str, confirmed: Message) {
        self.messages.retain(|m| m.id != placeholder_id);
        if self.contains(&confirmed.id) {
            return;
        }
        self.insert_sorted(confirmed);
    }

    /// Integrate a message delivered via the realtime channel. Returns false
    /// when the id was already present (e.g. the send confirmation won the
    /// race) and nothing changed.
    pub fn reconcile_pushed(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.insert_sorted(message);
        true
    }

    /// Flip a placeholder to `Failed` in place, keeping it visible for the
    /// retry affordance.
    pub fn fail(&mut self, placeholder_id: &str, reason: &str) {
        if let Some(m) = self.messages.iter_mut().find(|m| m.id == placeholder_id) {
            m.delivery = MessageDeliveryState::Failed {
                reason: reason.to_string(),
            };
        }
    }

    pub fn mark_pending(&mut self, placeholder_id: &str) {
        if let Some(m) = self.messages.iter_mut().find(|m| m.id == placeholder_id) {
            m.delivery = MessageDeliveryState::Pending;
        }
    }

    /// Rollback: remove a failed/abandoned placeholder entirely.
    pub fn remove(&mut self, placeholder_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != placeholder_id);
        self.messages.len() != before
    }
}

/// Timelines for every conversation touched this session. Kept across
/// conversation switches so reopening shows cached history instantly while
/// the refresh is in flight.
#[derive(Debug, Default)]
pub struct TimelineStore {
    timelines: HashMap<String, Timeline>,
}

impl TimelineStore {
    pub fn entry(&mut self, conversation_id: &str) -> &mut Timeline {
        self.timelines.entry(conversation_id.to_string()).or_default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Timeline> {
        self.timelines.get(conversation_id)
    }

    pub fn clear(&mut self) {
        self.timelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{new_placeholder_id, MessageAttribution};

    fn server_msg(id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "42".to_string(),
            sender_id: Some(1),
            actual_sender_id: None,
            sender_role: None,
            text: Some(format!("msg {id}")),
            image_url: None,
            created_at,
            delivery: MessageDeliveryState::Confirmed,
            attribution: MessageAttribution::Theirs,
        }
    }

    fn pending_msg(id: &str, created_at: i64) -> Message {
        Message {
            delivery: MessageDeliveryState::Pending,
            attribution: MessageAttribution::Mine,
            ..server_msg(id, created_at)
        }
    }

    fn ids(t: &Timeline) -> Vec<&str> {
        t.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn confirm_then_push_yields_one_entry() {
        let mut t = Timeline::default();
        let ph = new_placeholder_id();
        t.insert_optimistic(pending_msg(&ph, 100));
        t.confirm(&ph, server_msg("m-100", 101));
        assert!(!t.reconcile_pushed(server_msg("m-100", 101)));
        assert_eq!(ids(&t), vec!["m-100"]);
    }

    #[test]
    fn push_then_confirm_yields_one_entry() {
        let mut t = Timeline::default();
        let ph = new_placeholder_id();
        t.insert_optimistic(pending_msg(&ph, 100));
        assert!(t.reconcile_pushed(server_msg("m-100", 101)));
        t.confirm(&ph, server_msg("m-100", 101));
        assert_eq!(ids(&t), vec!["m-100"]);
    }

    #[test]
    fn repeated_pushes_are_idempotent() {
        let mut t = Timeline::default();
        assert!(t.reconcile_pushed(server_msg("m-1", 10)));
        assert!(!t.reconcile_pushed(server_msg("m-1", 10)));
        assert!(!t.reconcile_pushed(server_msg("m-1", 10)));
        assert_eq!(ids(&t), vec!["m-1"]);
    }

    #[test]
    fn pushed_messages_sort_by_created_at() {
        let mut t = Timeline::default();
        t.reconcile_pushed(server_msg("m-3", 30));
        t.reconcile_pushed(server_msg("m-1", 10));
        t.reconcile_pushed(server_msg("m-2", 20));
        assert_eq!(ids(&t), vec!["m-1", "m-2", "m-3"]);
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut t = Timeline::default();
        t.reconcile_pushed(server_msg("m-a", 10));
        t.reconcile_pushed(server_msg("m-b", 10));
        assert_eq!(ids(&t), vec!["m-a", "m-b"]);
    }

    #[test]
    fn pending_placeholder_pins_its_position() {
        let mut t = Timeline::default();
        t.reconcile_pushed(server_msg("m-1", 10));
        let ph = new_placeholder_id();
        // Server clock marginally ahead of the local clock: the placeholder
        // still stays where the sender put it.
        t.insert_optimistic(pending_msg(&ph, 5));
        t.reconcile_pushed(server_msg("m-2", 8));
        assert_eq!(ids(&t), vec!["m-2", "m-1", ph.as_str()]);
    }

    #[test]
    fn confirmation_resorts_by_server_timestamp() {
        let mut t = Timeline::default();
        t.reconcile_pushed(server_msg("m-1", 10));
        t.reconcile_pushed(server_msg("m-2", 20));
        let ph = new_placeholder_id();
        t.insert_optimistic(pending_msg(&ph, 15));
        t.confirm(&ph, server_msg("m-3", 15));
        assert_eq!(ids(&t), vec!["m-1", "m-3", "m-2"]);
    }

    #[test]
    fn rollback_removes_placeholder_completely() {
        let mut t = Timeline::default();
        let ph = new_placeholder_id();
        t.insert_optimistic(pending_msg(&ph, 100));
        t.fail(&ph, "network error");
        assert!(t.messages()[0].is_failed());
        assert!(t.remove(&ph));
        assert!(!t.contains(&ph));
        assert!(t.messages().is_empty());
        assert!(!t.remove(&ph));
    }

    #[test]
    fn replace_keeps_local_placeholders() {
        let mut t = Timeline::default();
        let ph = new_placeholder_id();
        t.reconcile_pushed(server_msg("stale", 1));
        t.insert_optimistic(pending_msg(&ph, 100));
        t.replace(vec![server_msg("m-1", 10), server_msg("m-2", 20)]);
        assert_eq!(ids(&t), vec!["m-1", "m-2", ph.as_str()]);
    }
}
