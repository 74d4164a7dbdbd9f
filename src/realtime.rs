//! Realtime boundary. The engine consumes pushed message events through the
//! `RealtimeTransport` trait; the wire protocol behind it (websocket framing,
//! channel auth handshakes) belongs to the embedding shell. Decoupling the
//! transport as a channel of JSON payloads keeps the dedupe/reconcile logic
//! testable without a live socket.

use async_trait::async_trait;

use crate::error::SubscriptionError;

/// Private per-conversation channel name, namespaced by conversation id.
pub fn conversation_channel(conversation_id: &str) -> String {
    format!("private-conversation.{conversation_id}")
}

/// A live subscription: a stream of raw event payloads plus a best-effort
/// leave signal. Dropping the handle also ends the subscription.
pub struct RealtimeSubscription {
    pub events: flume::Receiver<serde_json::Value>,
    leave_tx: Option<flume::Sender<()>>,
}

impl RealtimeSubscription {
    pub fn new(events: flume::Receiver<serde_json::Value>, leave_tx: Option<flume::Sender<()>>) -> Self {
        Self { events, leave_tx }
    }

    /// Best-effort unsubscribe; errors are deliberately swallowed.
    pub fn leave(&self) {
        if let Some(tx) = &self.leave_tx {
            let _ = tx.try_send(());
        }
    }
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Subscribe to a private channel with the given bearer credential.
    /// Implementations deliver one JSON payload per pushed message event.
    async fn subscribe(
        &self,
        channel: &str,
        bearer: Option<&str>,
    ) -> Result<RealtimeSubscription, SubscriptionError>;
}

/// Placeholder transport for shells that have not wired a realtime client.
/// Every subscribe fails, which the engine treats as degraded mode: the UI
/// keeps working off REST refreshes.
pub struct DisabledRealtimeTransport;

#[async_trait]
impl RealtimeTransport for DisabledRealtimeTransport {
    async fn subscribe(
        &self,
        _channel: &str,
        _bearer: Option<&str>,
    ) -> Result<RealtimeSubscription, SubscriptionError> {
        Err(SubscriptionError::Unavailable)
    }
}
