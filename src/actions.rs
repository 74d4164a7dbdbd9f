use crate::state::{ImageAttachment, Viewer};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    SetViewer {
        viewer: Viewer,
    },
    Logout,

    // Conversation list
    RefreshConversations,
    SetSearchQuery {
        query: String,
    },
    SetPropertyFilter {
        property_id: Option<i64>,
    },
    StartConversation {
        recipient_id: i64,
        property_id: Option<i64>,
    },
    MarkConversationRead {
        conversation_id: String,
    },

    // Active conversation
    OpenConversation {
        conversation_id: String,
    },
    CloseConversation,
    SendMessage {
        conversation_id: String,
        text: String,
        image: Option<ImageAttachment>,
    },
    RetryMessage {
        conversation_id: String,
        message_id: String,
    },
    DiscardFailedMessage {
        conversation_id: String,
        message_id: String,
    },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message bodies or image bytes).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::SetViewer { .. } => "SetViewer",
            AppAction::Logout => "Logout",
            AppAction::RefreshConversations => "RefreshConversations",
            AppAction::SetSearchQuery { .. } => "SetSearchQuery",
            AppAction::SetPropertyFilter { .. } => "SetPropertyFilter",
            AppAction::StartConversation { .. } => "StartConversation",
            AppAction::MarkConversationRead { .. } => "MarkConversationRead",
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DiscardFailedMessage { .. } => "DiscardFailedMessage",
            AppAction::ClearToast => "ClearToast",
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
