use crate::api::{ConversationRecord, MessageRecord};
use crate::error::{ApiError, SubscriptionError};
use crate::state::EngineState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(EngineState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // REST results
    ConversationsLoaded {
        result: Result<Vec<ConversationRecord>, ApiError>,
    },
    /// `token` is captured at request time; a mismatch with the current token
    /// means the user switched conversations while the fetch was in flight and
    /// the result must be discarded (stale-response guard).
    HistoryLoaded {
        conversation_id: String,
        token: u64,
        result: Result<Vec<MessageRecord>, ApiError>,
    },
    SendResult {
        conversation_id: String,
        placeholder_id: String,
        result: Result<MessageRecord, ApiError>,
    },
    StartConversationResult {
        result: Result<ConversationRecord, ApiError>,
    },

    // Realtime path. `generation` identifies the subscription that produced
    // the event; anything from a superseded generation is dropped before it
    // can leak into another conversation's timeline.
    PushedMessage {
        conversation_id: String,
        generation: u64,
        payload: serde_json::Value,
    },
    SubscriptionEstablished {
        conversation_id: String,
        generation: u64,
        /// True when this is a reconnect after a drop or failed attempt; the
        /// core must force a history catch-up fetch because missed events are
        /// not replayed by the transport.
        resumed: bool,
    },
    SubscriptionFailed {
        conversation_id: String,
        generation: u64,
        error: SubscriptionError,
        attempt: u32,
    },
    SubscriptionLost {
        generation: u64,
    },

    Toast(String),
}
