use serde::{Deserialize, Serialize};

/// Namespace prefix for locally generated message ids. Server ids never carry
/// it, so a `local-*` id always denotes a not-yet-confirmed optimistic entry.
pub const PLACEHOLDER_ID_PREFIX: &str = "local-";

pub fn new_placeholder_id() -> String {
    format!("{PLACEHOLDER_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_ID_PREFIX)
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Tenant,
    Landlord,
    Caretaker,
    Admin,
}

/// Capability flags granted to a caretaker account by its landlord.
/// Absent flags mean "not granted".
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaretakerPermissions {
    pub messages: bool,
    pub maintenance: bool,
    pub listings: bool,
}

impl Default for CaretakerPermissions {
    fn default() -> Self {
        Self {
            messages: false,
            maintenance: false,
            listings: false,
        }
    }
}

/// The authenticated user as seen by the engine. Supplied by the shell after
/// login (`AppAction::SetViewer`); the engine never reads ambient auth state.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub role: UserRole,
    pub caretaker_permissions: Option<CaretakerPermissions>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub other_user_id: i64,
    pub other_user_name: String,
    pub other_user_avatar_url: Option<String>,
    pub property_id: Option<i64>,
    pub property_title: Option<String>,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Pending,
    Confirmed,
    Failed { reason: String },
}

/// Resolved "is this mine" verdict, precomputed so web and mobile shells
/// render identical attribution without re-implementing the caretaker rules.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageAttribution {
    Mine,
    /// Sent through the landlord identity by this caretaker viewer
    /// ("sent by you (proxy)" in the UI).
    MineViaProxy,
    Theirs,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: Option<i64>,
    /// Real human behind a caretaker-proxied send; only set by the backend.
    pub actual_sender_id: Option<i64>,
    pub sender_role: Option<String>,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub delivery: MessageDeliveryState,
    pub attribution: MessageAttribution,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, MessageDeliveryState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, MessageDeliveryState::Failed { .. })
    }
}

/// Image payload picked by the shell; the engine only forwards it to the API.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ImageAttachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub can_send: bool,
    pub read_only_reason: Option<String>,
    /// False while the realtime channel is down (degraded mode: REST only).
    pub realtime_live: bool,
}

/// "In flight" flags for operations the UI should reflect with a spinner.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_conversations: bool,
    pub loading_history: bool,
    pub starting_conversation: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_conversations: false,
            loading_history: false,
            starting_conversation: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct EngineState {
    pub rev: u64,
    pub viewer: Option<Viewer>,
    pub busy: BusyState,
    /// Projection of the cached conversation list through the current
    /// search/property filter; the unfiltered list stays inside the store.
    pub conversation_list: Vec<ConversationSummary>,
    pub current_conversation: Option<ConversationViewState>,
    pub search_query: String,
    pub property_filter: Option<i64>,
    pub toast: Option<String>,
}

impl EngineState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            viewer: None,
            busy: BusyState::idle(),
            conversation_list: vec![],
            current_conversation: None,
            search_query: String::new(),
            property_filter: None,
            toast: None,
        }
    }
}

pub fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_ids_are_namespaced_and_unique() {
        let a = new_placeholder_id();
        let b = new_placeholder_id();
        assert!(is_placeholder_id(&a));
        assert!(is_placeholder_id(&b));
        assert_ne!(a, b);
        assert!(!is_placeholder_id("m-100"));
        assert!(!is_placeholder_id("1042"));
    }
}
