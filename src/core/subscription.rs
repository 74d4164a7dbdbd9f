// Realtime subscription lifecycle: at most one active subscription, owned by
// the core; a background driver task per subscription generation handles
// subscribe, event pumping, and bounded jittered reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::Sender;

use super::EngineCore;
use crate::realtime::{conversation_channel, RealtimeSubscription};
use crate::updates::{CoreMsg, InternalEvent};

/// Handle for the single allowed active subscription. Dropping it (or firing
/// `stop`) ends the driver task; the generation counter makes any events it
/// still manages to emit inert.
pub(super) struct ActiveSubscription {
    pub(super) conversation_id: String,
    pub(super) generation: u64,
    pub(super) alive: Arc<AtomicBool>,
    pub(super) stop: flume::Sender<()>,
    /// Whether the channel is currently delivering events (false = degraded).
    pub(super) live: bool,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct BackoffPolicy {
    pub(super) base_ms: u64,
    pub(super) max_attempts: u32,
}

impl BackoffPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        use rand::Rng;
        let capped = self.base_ms.saturating_mul(1u64 << attempt.min(6));
        let jitter = rand::thread_rng().gen_range(0..=capped / 2 + 1);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

impl EngineCore {
    /// Subscribe to one conversation's private channel, tearing down whatever
    /// was active first. Teardown-before-subscribe plus the generation guard
    /// is what prevents cross-conversation event leakage.
    pub(super) fn subscribe_conversation(&mut self, conversation_id: &str) {
        self.teardown_subscription();
        if !self.network_enabled() {
            return;
        }

        self.subscription_generation = self.subscription_generation.wrapping_add(1);
        let generation = self.subscription_generation;
        let alive = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        self.subscription = Some(ActiveSubscription {
            conversation_id: conversation_id.to_string(),
            generation,
            alive: alive.clone(),
            stop: stop_tx,
            live: false,
        });

        let transport = self.transport.clone();
        let tokens = self.tokens.clone();
        let tx = self.core_sender.clone();
        let channel = conversation_channel(conversation_id);
        let conversation_id = conversation_id.to_string();
        let policy = BackoffPolicy {
            base_ms: self.config.backoff_base_ms(),
            max_attempts: self.config.reconnect_max_attempts(),
        };

        tracing::debug!(%channel, generation, "realtime subscribe");
        self.runtime.spawn(drive_subscription(
            transport,
            tokens,
            tx,
            conversation_id,
            channel,
            generation,
            alive,
            stop_rx,
            policy,
        ));
    }

    pub(super) fn teardown_subscription(&mut self) {
        if let Some(sub) = self.subscription.take() {
            tracing::debug!(conversation_id = %sub.conversation_id, generation = sub.generation, "realtime unsubscribe");
            sub.alive.store(false, Ordering::SeqCst);
            // Best-effort; the driver also stops when the handle is dropped.
            let _ = sub.stop.try_send(());
        }
    }

    /// True only for events produced by the current subscription; anything
    /// else is a leftover from a torn-down generation.
    pub(super) fn is_current_generation(&self, generation: u64) -> bool {
        self.subscription
            .as_ref()
            .map(|s| s.generation == generation)
            .unwrap_or(false)
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_subscription(
    transport: Arc<dyn crate::realtime::RealtimeTransport>,
    tokens: Arc<dyn crate::api::TokenProvider>,
    tx: Sender<CoreMsg>,
    conversation_id: String,
    channel: String,
    generation: u64,
    alive: Arc<AtomicBool>,
    stop_rx: flume::Receiver<()>,
    policy: BackoffPolicy,
) {
    let mut attempt: u32 = 0;
    // Reconnects (and retries after a failed attempt) may have missed pushed
    // events; the core reacts to `resumed = true` with a history catch-up
    // fetch since the transport does not replay.
    let mut resumed = false;
    loop {
        if !alive.load(Ordering::SeqCst) {
            return;
        }
        let bearer = tokens.bearer_token();
        match transport.subscribe(&channel, bearer.as_deref()).await {
            Ok(sub) => {
                attempt = 0;
                let _ = tx.send(CoreMsg::Internal(Box::new(
                    InternalEvent::SubscriptionEstablished {
                        conversation_id: conversation_id.clone(),
                        generation,
                        resumed,
                    },
                )));
                let transport_dropped =
                    pump_events(&sub, &tx, &conversation_id, generation, &alive, &stop_rx).await;
                sub.leave();
                if !transport_dropped {
                    return;
                }
                resumed = true;
                tracing::warn!(%channel, "realtime connection lost");
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SubscriptionLost {
                    generation,
                })));
            }
            Err(e) => {
                attempt += 1;
                tracing::warn!(%channel, attempt, error = %e, "realtime subscribe failed");
                let _ = tx.send(CoreMsg::Internal(Box::new(
                    InternalEvent::SubscriptionFailed {
                        conversation_id: conversation_id.clone(),
                        generation,
                        error: e,
                        attempt,
                    },
                )));
                if attempt >= policy.max_attempts {
                    tracing::warn!(%channel, "realtime retries exhausted; staying in degraded mode");
                    return;
                }
                resumed = true;
            }
        }

        let delay = policy.delay(attempt);
        tokio::select! {
            _ = stop_rx.recv_async() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump pushed events into the core mailbox. Returns true when the transport
/// dropped the subscription (reconnect case), false on deliberate teardown.
async fn pump_events(
    sub: &RealtimeSubscription,
    tx: &Sender<CoreMsg>,
    conversation_id: &str,
    generation: u64,
    alive: &Arc<AtomicBool>,
    stop_rx: &flume::Receiver<()>,
) -> bool {
    loop {
        tokio::select! {
            _ = stop_rx.recv_async() => return false,
            ev = sub.events.recv_async() => match ev {
                Ok(payload) => {
                    if !alive.load(Ordering::SeqCst) {
                        return false;
                    }
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PushedMessage {
                        conversation_id: conversation_id.to_string(),
                        generation,
                        payload,
                    })));
                }
                Err(_) => return true,
            },
        }
    }
}
