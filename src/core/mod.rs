pub(crate) mod config;
pub(crate) mod conversations;
pub(crate) mod identity;
pub(crate) mod outbox;
pub(crate) mod permissions;
mod subscription;
pub(crate) mod timeline;

use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::api::{MessageRecord, MessagingApi, TokenProvider};
use crate::error::SendError;
use crate::realtime::RealtimeTransport;
use crate::state::{
    new_placeholder_id, now_seconds, BusyState, ConversationViewState, EngineState,
    ImageAttachment, Message, MessageAttribution, MessageDeliveryState,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use conversations::{summarize_conversation, ConversationStore};
use outbox::{Draft, Outbox};
use subscription::ActiveSubscription;
use timeline::TimelineStore;

/// Single-owner state actor: every mutation of the conversation list, the
/// timelines, or the outbox happens here, one mailbox message at a time.
/// Async work (REST, realtime) runs on the owned tokio runtime and reports
/// back through `InternalEvent`s, so races only ever interleave at message
/// granularity and id-based idempotency in the stores does the rest.
pub struct EngineCore {
    pub state: EngineState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<EngineState>>,

    config: config::EngineConfig,
    runtime: tokio::runtime::Runtime,

    api: Arc<dyn MessagingApi>,
    transport: Arc<dyn RealtimeTransport>,
    tokens: Arc<dyn TokenProvider>,

    conversations: ConversationStore,
    timelines: TimelineStore,
    outbox: Outbox,

    subscription: Option<ActiveSubscription>,
    subscription_generation: u64,
    history_token: u64,
}

impl EngineCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<EngineState>>,
        api: Arc<dyn MessagingApi>,
        transport: Arc<dyn RealtimeTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let config = config::load_engine_config(&data_dir);
        let state = EngineState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state,
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            api,
            transport,
            tokens,
            conversations: ConversationStore::default(),
            timelines: TimelineStore::default(),
            outbox: Outbox::default(),
            subscription: None,
            subscription_generation: 0,
            history_token: 0,
        };

        // Ensure FfiMessenger.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &EngineState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a snapshot
        // resync never loses the message.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn is_signed_in(&self) -> bool {
        self.state.viewer.is_some()
    }

    /// Outgoing timestamps are second-granularity; rapid sends can share the
    /// same second. Keep them monotonic so optimistic ordering is stable.
    fn next_outgoing_timestamp(&mut self) -> i64 {
        let now = now_seconds();
        if now <= self.last_outgoing_ts {
            self.last_outgoing_ts += 1;
        } else {
            self.last_outgoing_ts = now;
        }
        self.last_outgoing_ts
    }

    /// Recompute the UI projection of the conversation list through the
    /// current search/property filter. The unfiltered list stays in the store.
    fn sync_conversation_list(&mut self) {
        self.state.conversation_list = self
            .conversations
            .filtered(&self.state.search_query, self.state.property_filter);
    }

    /// Rebuild the active conversation view from the timeline store, the
    /// permission gate, and the subscription status.
    fn sync_current_view(&mut self) {
        let Some(cid) = self
            .state
            .current_conversation
            .as_ref()
            .map(|c| c.conversation_id.clone())
        else {
            return;
        };
        let messages = self
            .timelines
            .get(&cid)
            .map(|t| t.messages().to_vec())
            .unwrap_or_default();
        let (can_send, read_only_reason) = match self.state.viewer.as_ref() {
            Some(viewer) => {
                let cap = permissions::send_capability(viewer);
                (cap.can_send, cap.read_only_reason)
            }
            None => (false, None),
        };
        let realtime_live = self
            .subscription
            .as_ref()
            .map(|s| s.live && s.conversation_id == cid)
            .unwrap_or(false);
        self.state.current_conversation = Some(ConversationViewState {
            conversation_id: cid,
            messages,
            can_send,
            read_only_reason,
            realtime_live,
        });
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log the full action: it can contain message bodies
                // and image bytes.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::SetViewer { viewer } => {
                self.state.viewer = Some(viewer);
                self.sync_current_view();
                self.emit_state();
            }
            AppAction::Logout => {
                self.teardown_subscription();
                self.conversations.clear();
                self.timelines.clear();
                self.outbox.clear();
                self.last_outgoing_ts = 0;
                self.state.viewer = None;
                self.state.current_conversation = None;
                self.state.conversation_list = vec![];
                self.state.search_query = String::new();
                self.state.property_filter = None;
                self.state.busy = BusyState::idle();
                self.emit_state();
            }
            AppAction::RefreshConversations => {
                if !self.is_signed_in() {
                    self.toast("Please sign in first");
                    return;
                }
                self.refresh_conversations();
            }
            AppAction::SetSearchQuery { query } => {
                self.state.search_query = query;
                self.sync_conversation_list();
                self.emit_state();
            }
            AppAction::SetPropertyFilter { property_id } => {
                self.state.property_filter = property_id;
                self.sync_conversation_list();
                self.emit_state();
            }
            AppAction::StartConversation {
                recipient_id,
                property_id,
            } => {
                if !self.is_signed_in() {
                    self.toast("Please sign in first");
                    return;
                }
                self.state.busy.starting_conversation = true;
                self.emit_state();
                if !self.network_enabled() {
                    self.state.busy.starting_conversation = false;
                    self.emit_state();
                    return;
                }
                let api = self.api.clone();
                let tx = self.core_sender.clone();
                self.runtime.spawn(async move {
                    let result = api.start_conversation(recipient_id, property_id).await;
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::StartConversationResult { result },
                    )));
                });
            }
            AppAction::MarkConversationRead { conversation_id } => {
                self.conversations.mark_read(&conversation_id);
                self.sync_conversation_list();
                self.emit_state();
            }
            AppAction::OpenConversation { conversation_id } => {
                if !self.is_signed_in() {
                    self.toast("Please sign in first");
                    return;
                }
                if !self.conversations.contains(&conversation_id) {
                    self.toast("Conversation not found");
                    return;
                }
                self.open_conversation(&conversation_id);
            }
            AppAction::CloseConversation => {
                self.teardown_subscription();
                self.state.current_conversation = None;
                // An in-flight history load for the closed conversation will
                // be discarded; don't leave its spinner stuck.
                self.state.busy.loading_history = false;
                self.emit_state();
            }
            AppAction::SendMessage {
                conversation_id,
                text,
                image,
            } => self.handle_send(conversation_id, text, image),
            AppAction::RetryMessage {
                conversation_id,
                message_id,
            } => {
                if !self.is_signed_in() {
                    self.toast("Please sign in first");
                    return;
                }
                let Some(draft) = self.outbox.get(&message_id).cloned() else {
                    self.toast("Nothing to retry");
                    return;
                };
                // Only a Failed entry may be resubmitted; a retry racing an
                // in-flight send would otherwise double-submit the draft.
                let failed = self
                    .timelines
                    .get(&conversation_id)
                    .and_then(|t| t.messages().iter().find(|m| m.id == message_id))
                    .map(Message::is_failed)
                    .unwrap_or(false);
                if !failed {
                    return;
                }
                self.timelines.entry(&conversation_id).mark_pending(&message_id);
                self.sync_current_view();
                self.emit_state();
                self.submit_send(conversation_id, message_id, draft.text, draft.image);
            }
            AppAction::DiscardFailedMessage {
                conversation_id,
                message_id,
            } => {
                self.outbox.remove(&message_id);
                self.timelines.entry(&conversation_id).remove(&message_id);
                self.sync_current_view();
                self.emit_state();
            }
            AppAction::ClearToast => {
                self.state.toast = None;
                self.emit_state();
            }
            AppAction::Foregrounded => {
                if !self.is_signed_in() {
                    return;
                }
                self.refresh_conversations();
                if let Some(cid) = self
                    .state
                    .current_conversation
                    .as_ref()
                    .map(|c| c.conversation_id.clone())
                {
                    // Events missed while backgrounded are not replayed.
                    self.load_history(&cid);
                    self.subscribe_conversation(&cid);
                    self.sync_current_view();
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ConversationsLoaded { result } => {
                self.state.busy.loading_conversations = false;
                match result {
                    Ok(records) => {
                        let summaries = records.iter().map(summarize_conversation).collect();
                        self.conversations.replace_all(summaries);
                    }
                    Err(e) => {
                        // Keep the cached list; the UI shows stale data plus
                        // a transient error instead of an empty screen.
                        tracing::warn!(error = %e, "conversation list refresh failed");
                        self.state.toast = Some(format!("Couldn't refresh conversations: {e}"));
                    }
                }
                self.sync_conversation_list();
                self.emit_state();
            }
            InternalEvent::HistoryLoaded {
                conversation_id,
                token,
                result,
            } => {
                let current = self
                    .state
                    .current_conversation
                    .as_ref()
                    .map(|c| c.conversation_id.clone());
                if token != self.history_token || current.as_deref() != Some(&conversation_id) {
                    tracing::debug!(%conversation_id, "discarding stale history response");
                    return;
                }
                self.state.busy.loading_history = false;
                match result {
                    Ok(records) => {
                        let viewer = self.state.viewer.clone();
                        let messages = records
                            .iter()
                            .map(|r| {
                                identity::normalize_message(r, &conversation_id, viewer.as_ref())
                            })
                            .collect();
                        self.timelines.entry(&conversation_id).replace(messages);
                    }
                    Err(e) => {
                        tracing::warn!(%conversation_id, error = %e, "history load failed");
                        self.state.toast = Some(format!("Couldn't load messages: {e}"));
                    }
                }
                self.sync_current_view();
                self.emit_state();
            }
            InternalEvent::SendResult {
                conversation_id,
                placeholder_id,
                result,
            } => {
                tracing::info!(
                    ok = result.is_ok(),
                    %conversation_id,
                    %placeholder_id,
                    "send_result"
                );
                match result {
                    Ok(record) => {
                        let viewer = self.state.viewer.clone();
                        let message =
                            identity::normalize_message(&record, &conversation_id, viewer.as_ref());
                        self.outbox.remove(&placeholder_id);
                        self.timelines
                            .entry(&conversation_id)
                            .confirm(&placeholder_id, message.clone());
                        self.conversations.patch_from_send(
                            &conversation_id,
                            preview_text(&message).as_deref(),
                            message.created_at,
                        );
                    }
                    Err(e) => {
                        // Rollback to Failed, draft retained for retry; the
                        // composed input is never force-cleared.
                        self.timelines
                            .entry(&conversation_id)
                            .fail(&placeholder_id, &e.to_string());
                        self.state.toast = Some("Message failed to send".to_string());
                    }
                }
                self.sync_current_view();
                self.sync_conversation_list();
                self.emit_state();
            }
            InternalEvent::StartConversationResult { result } => {
                self.state.busy.starting_conversation = false;
                match result {
                    Ok(record) => {
                        let summary = summarize_conversation(&record);
                        let id = summary.id.clone();
                        self.conversations.upsert_from_start(summary);
                        self.open_conversation(&id);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "start conversation failed");
                        self.toast(format!("Couldn't start conversation: {e}"));
                    }
                }
            }
            InternalEvent::PushedMessage {
                conversation_id,
                generation,
                payload,
            } => {
                if !self.is_current_generation(generation) {
                    tracing::debug!(%conversation_id, generation, "dropping event from stale subscription");
                    return;
                }
                let record: MessageRecord = match serde_json::from_value(payload) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(%conversation_id, error = %e, "undecodable pushed message");
                        return;
                    }
                };
                let viewer = self.state.viewer.clone();
                let message =
                    identity::normalize_message(&record, &conversation_id, viewer.as_ref());
                let appended = self
                    .timelines
                    .entry(&conversation_id)
                    .reconcile_pushed(message.clone());
                if appended {
                    let on_screen = self
                        .state
                        .current_conversation
                        .as_ref()
                        .map(|c| c.conversation_id == conversation_id)
                        .unwrap_or(false);
                    let bump_unread =
                        !on_screen && message.attribution == MessageAttribution::Theirs;
                    self.conversations.apply_pushed(
                        &conversation_id,
                        preview_text(&message).as_deref(),
                        message.created_at,
                        bump_unread,
                    );
                }
                self.sync_current_view();
                self.sync_conversation_list();
                self.emit_state();
            }
            InternalEvent::SubscriptionEstablished {
                conversation_id,
                generation,
                resumed,
            } => {
                if !self.is_current_generation(generation) {
                    return;
                }
                if let Some(sub) = self.subscription.as_mut() {
                    sub.live = true;
                }
                if resumed {
                    tracing::info!(%conversation_id, "realtime resumed; forcing history catch-up");
                    self.load_history(&conversation_id);
                }
                self.sync_current_view();
                self.emit_state();
            }
            InternalEvent::SubscriptionFailed {
                conversation_id,
                generation,
                error,
                attempt,
            } => {
                if !self.is_current_generation(generation) {
                    return;
                }
                // Degraded mode only; never fatal and never a toast storm.
                tracing::warn!(%conversation_id, attempt, error = %error, "realtime degraded");
                if let Some(sub) = self.subscription.as_mut() {
                    sub.live = false;
                }
                self.sync_current_view();
                self.emit_state();
            }
            InternalEvent::SubscriptionLost { generation } => {
                if !self.is_current_generation(generation) {
                    return;
                }
                if let Some(sub) = self.subscription.as_mut() {
                    sub.live = false;
                }
                self.sync_current_view();
                self.emit_state();
            }
            InternalEvent::Toast(msg) => {
                tracing::info!(%msg, "toast");
                self.toast(msg);
            }
        }
    }

    fn refresh_conversations(&mut self) {
        self.state.busy.loading_conversations = true;
        self.emit_state();
        if !self.network_enabled() {
            self.state.busy.loading_conversations = false;
            self.emit_state();
            return;
        }
        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api.list_conversations().await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationsLoaded { result },
            )));
        });
    }

    /// Shared open path for `OpenConversation` and a successful
    /// `StartConversation`: reset unread, show cached timeline immediately,
    /// refresh history (stale-guarded), move the realtime subscription over.
    fn open_conversation(&mut self, conversation_id: &str) {
        self.conversations.mark_read(conversation_id);
        self.state.current_conversation = Some(ConversationViewState {
            conversation_id: conversation_id.to_string(),
            messages: vec![],
            can_send: false,
            read_only_reason: None,
            realtime_live: false,
        });
        self.sync_current_view();
        self.load_history(conversation_id);
        self.subscribe_conversation(conversation_id);
        self.sync_conversation_list();
        self.emit_state();
    }

    fn load_history(&mut self, conversation_id: &str) {
        // Bumping the token invalidates any in-flight load for a previously
        // selected conversation.
        self.history_token = self.history_token.wrapping_add(1);
        let token = self.history_token;
        self.state.busy.loading_history = true;
        if !self.network_enabled() {
            let _ = self.core_sender.send(CoreMsg::Internal(Box::new(
                InternalEvent::HistoryLoaded {
                    conversation_id: conversation_id.to_string(),
                    token,
                    result: Ok(vec![]),
                },
            )));
            return;
        }
        let api = self.api.clone();
        let tx = self.core_sender.clone();
        let cid = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = api.list_messages(&cid).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryLoaded {
                conversation_id: cid,
                token,
                result,
            })));
        });
    }

    fn handle_send(
        &mut self,
        conversation_id: String,
        text: String,
        image: Option<ImageAttachment>,
    ) {
        let Some(viewer) = self.state.viewer.clone() else {
            self.toast("Please sign in first");
            return;
        };
        let capability = permissions::send_capability(&viewer);
        let text = text.trim().to_string();
        match outbox::validate(&capability, &text, &image) {
            Err(SendError::PermissionDenied { reason }) => {
                // Gate fires before any optimistic insert or network call.
                tracing::warn!(%conversation_id, "send blocked by permission gate");
                self.toast(reason);
                return;
            }
            Err(SendError::EmptyMessage) => return,
            Ok(()) => {}
        }

        let ts = self.next_outgoing_timestamp();
        let placeholder_id = new_placeholder_id();
        let text_opt = (!text.is_empty()).then(|| text.clone());
        // The echo must carry the attachment too: an image-only send would
        // otherwise render as an empty bubble until confirmation. The `local:`
        // scheme tells shells to resolve the preview from the picker, not the
        // network; the confirmed record replaces it with the uploaded URL.
        let local_image_url = image.as_ref().map(|img| format!("local://{}", img.filename));

        self.outbox.insert(
            placeholder_id.clone(),
            Draft {
                conversation_id: conversation_id.clone(),
                text: text_opt.clone(),
                image: image.clone(),
                created_at: ts,
            },
        );
        // Optimistic echo: visible immediately, collapsed on confirm.
        self.timelines
            .entry(&conversation_id)
            .insert_optimistic(Message {
                id: placeholder_id.clone(),
                conversation_id: conversation_id.clone(),
                sender_id: Some(viewer.user_id),
                actual_sender_id: None,
                sender_role: None,
                text: text_opt.clone(),
                image_url: local_image_url,
                created_at: ts,
                delivery: MessageDeliveryState::Pending,
                attribution: MessageAttribution::Mine,
            });
        self.sync_current_view();
        self.emit_state();

        self.submit_send(conversation_id, placeholder_id, text_opt, image);
    }

    /// Single submission, no automatic retry: a failed send stays Failed
    /// until the user retries or discards it.
    fn submit_send(
        &mut self,
        conversation_id: String,
        placeholder_id: String,
        text: Option<String>,
        image: Option<ImageAttachment>,
    ) {
        if !self.network_enabled() {
            // Deterministic tests/dev: treat as immediate success.
            let record = MessageRecord {
                id: format!("offline-{placeholder_id}"),
                conversation_id: Some(conversation_id.clone()),
                sender_id: self.state.viewer.as_ref().map(|v| v.user_id),
                user_id: None,
                sender: None,
                from: None,
                actual_sender_id: None,
                sender_role: None,
                text,
                image_url: None,
                created_at: self.last_outgoing_ts,
            };
            let _ = self.core_sender.send(CoreMsg::Internal(Box::new(
                InternalEvent::SendResult {
                    conversation_id,
                    placeholder_id,
                    result: Ok(record),
                },
            )));
            return;
        }
        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api
                .send_message(&conversation_id, text, image)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendResult {
                conversation_id,
                placeholder_id,
                result,
            })));
        });
    }
}

fn preview_text(message: &Message) -> Option<String> {
    message
        .text
        .clone()
        .or_else(|| message.image_url.as_ref().map(|_| "Photo".to_string()))
}
