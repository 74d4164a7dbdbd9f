//! Conversation list store: unique by id, ordered by most recent activity.

use crate::api::ConversationRecord;
use crate::state::ConversationSummary;

/// Normalize a wire conversation into the engine summary. The denormalized
/// last-message fields may lag the actual timeline until reconciled; the
/// timestamp prefers the explicit `last_message_at` and falls back to the
/// embedded last message.
pub fn summarize_conversation(record: &ConversationRecord) -> ConversationSummary {
    let other = record.other_user.clone().unwrap_or_default();
    ConversationSummary {
        id: record.id.clone(),
        other_user_id: other.id.unwrap_or(0),
        other_user_name: other.display_name(),
        other_user_avatar_url: other.profile_image,
        property_id: record.property.as_ref().and_then(|p| p.id),
        property_title: record.property.as_ref().and_then(|p| p.title.clone()),
        last_message_text: record.last_message.as_ref().and_then(|m| m.text.clone()),
        last_message_at: record
            .last_message_at
            .or_else(|| record.last_message.as_ref().map(|m| m.created_at)),
        unread_count: record.unread_count,
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<ConversationSummary>,
}

impl ConversationStore {
    pub fn all(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.iter().any(|c| c.id == conversation_id)
    }

    fn resort(&mut self) {
        // `None < Some(_)`, so descending on the Option pushes never-messaged
        // conversations to the bottom.
        self.conversations
            .sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    }

    /// Full replacement from a successful REST fetch. On fetch failure the
    /// caller never reaches this, so the cached list survives intact.
    pub fn replace_all(&mut self, list: Vec<ConversationSummary>) {
        let mut deduped: Vec<ConversationSummary> = Vec::with_capacity(list.len());
        for c in list {
            if !deduped.iter().any(|e| e.id == c.id) {
                deduped.push(c);
            }
        }
        self.conversations = deduped;
        self.resort();
    }

    /// Refresh one conversation's denormalized last-message fields after a
    /// confirmed send. Unknown id is a no-op: the send itself still succeeded.
    pub fn patch_from_send(&mut self, conversation_id: &str, text: Option<&str>, at: i64) {
        let Some(c) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return;
        };
        c.last_message_text = text.map(str::to_string);
        c.last_message_at = Some(at);
        self.resort();
    }

    /// Same patch for a pushed message, optionally bumping the unread count
    /// (the pushed conversation may not be the one on screen).
    pub fn apply_pushed(
        &mut self,
        conversation_id: &str,
        text: Option<&str>,
        at: i64,
        bump_unread: bool,
    ) {
        let Some(c) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return;
        };
        c.last_message_text = text.map(str::to_string);
        c.last_message_at = Some(at);
        if bump_unread {
            c.unread_count = c.unread_count.saturating_add(1);
        }
        self.resort();
    }

    /// Insert a conversation returned by "start conversation"; replaces any
    /// existing entry with the same id.
    pub fn upsert_from_start(&mut self, summary: ConversationSummary) {
        self.conversations.retain(|c| c.id != summary.id);
        self.conversations.push(summary);
        self.resort();
    }

    pub fn mark_read(&mut self, conversation_id: &str) {
        if let Some(c) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            c.unread_count = 0;
        }
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    /// Pure projection for the UI list: case-insensitive substring match on
    /// the participant name (or property title), optional property scoping.
    /// Never mutates stored state.
    pub fn filtered(&self, query: &str, property_filter: Option<i64>) -> Vec<ConversationSummary> {
        let needle = query.trim().to_lowercase();
        self.conversations
            .iter()
            .filter(|c| {
                if let Some(pid) = property_filter {
                    if c.property_id != Some(pid) {
                        return false;
                    }
                }
                if needle.is_empty() {
                    return true;
                }
                c.other_user_name.to_lowercase().contains(&needle)
                    || c.property_title
                        .as_deref()
                        .map(|t| t.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, name: &str, at: Option<i64>) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            other_user_id: 1,
            other_user_name: name.to_string(),
            other_user_avatar_url: None,
            property_id: None,
            property_title: None,
            last_message_text: None,
            last_message_at: at,
            unread_count: 0,
        }
    }

    fn ids(store: &ConversationStore) -> Vec<&str> {
        store.all().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn replace_all_dedupes_by_id_and_sorts_descending() {
        let mut store = ConversationStore::default();
        store.replace_all(vec![
            summary("a", "Avery", Some(10)),
            summary("b", "Blake", Some(30)),
            summary("a", "Avery dup", Some(99)),
            summary("c", "Casey", None),
        ]);
        assert_eq!(ids(&store), vec!["b", "a", "c"]);
        // First occurrence wins.
        assert_eq!(store.all()[1].other_user_name, "Avery");
    }

    #[test]
    fn patch_from_send_reorders_and_ignores_unknown_ids() {
        let mut store = ConversationStore::default();
        store.replace_all(vec![summary("a", "Avery", Some(10)), summary("b", "Blake", Some(30))]);
        store.patch_from_send("a", Some("latest"), 40);
        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.all()[0].last_message_text.as_deref(), Some("latest"));

        let before = store.all().to_vec();
        store.patch_from_send("missing", Some("x"), 50);
        assert_eq!(store.all(), &before[..]);
    }

    #[test]
    fn upsert_from_start_never_duplicates() {
        let mut store = ConversationStore::default();
        store.upsert_from_start(summary("a", "Avery", Some(10)));
        store.upsert_from_start(summary("a", "Avery again", Some(20)));
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.all()[0].other_user_name, "Avery again");
    }

    #[test]
    fn pushed_messages_can_bump_unread() {
        let mut store = ConversationStore::default();
        store.replace_all(vec![summary("a", "Avery", Some(10))]);
        store.apply_pushed("a", Some("ping"), 20, true);
        store.apply_pushed("a", Some("ping again"), 21, true);
        assert_eq!(store.all()[0].unread_count, 2);
        store.mark_read("a");
        assert_eq!(store.all()[0].unread_count, 0);
    }

    #[test]
    fn filter_is_a_pure_projection() {
        let mut store = ConversationStore::default();
        let mut with_property = summary("a", "Avery Stone", Some(10));
        with_property.property_id = Some(5);
        with_property.property_title = Some("Elm Street 12".to_string());
        store.replace_all(vec![with_property, summary("b", "Blake Reed", Some(20))]);

        let hits = store.filtered("avery", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let hits = store.filtered("elm", None);
        assert_eq!(hits.len(), 1);

        let hits = store.filtered("", Some(5));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let hits = store.filtered("blake", Some(5));
        assert!(hits.is_empty());

        // Store untouched by projections.
        assert_eq!(store.all().len(), 2);
        assert_eq!(ids(&store), vec!["b", "a"]);
    }
}
