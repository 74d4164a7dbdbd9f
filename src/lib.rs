mod actions;
mod api;
mod core;
mod error;
mod logging;
mod realtime;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use api::{
    ConversationRecord, HttpMessagingApi, MessageRecord, MessagingApi, OtherUserRecord,
    PropertyRecord, SenderRef, TokenProvider,
};
pub use error::{ApiError, SendError, SubscriptionError};
pub use realtime::{DisabledRealtimeTransport, RealtimeSubscription, RealtimeTransport};
pub use state::*;
pub use updates::*;

#[uniffi::export]
pub fn is_placeholder_message_id(id: &str) -> bool {
    state::is_placeholder_id(id)
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait StateReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// FFI entry point for the shared messaging engine. Platform shells construct
/// one instance, dispatch actions, and receive full-state snapshots through a
/// registered [`StateReconciler`].
#[derive(uniffi::Object)]
pub struct FfiMessenger {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<EngineState>>,
}

#[uniffi::export]
impl FfiMessenger {
    #[uniffi::constructor]
    pub fn new(data_dir: String, token_provider: Box<dyn TokenProvider>) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "FfiMessenger::new() starting");

        let tokens: Arc<dyn TokenProvider> = Arc::from(token_provider);
        let base_url = crate::core::config::load_engine_config(&data_dir).api_base_url();
        let api: Arc<dyn MessagingApi> = Arc::new(HttpMessagingApi::new(base_url, tokens.clone()));
        // The production realtime wiring is shell-provided; without it the
        // engine runs in degraded (REST-only) mode.
        let transport: Arc<dyn RealtimeTransport> = Arc::new(DisabledRealtimeTransport);
        Self::with_collaborators(data_dir, api, transport, tokens)
    }

    /// Current full state snapshot; safe to call from any thread at any time.
    pub fn state(&self) -> EngineState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn StateReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl FfiMessenger {
    /// Construct with injected collaborators. Not exported over FFI; used by
    /// tests and by shells that provide a real realtime transport.
    pub fn with_collaborators(
        data_dir: String,
        api: Arc<dyn MessagingApi>,
        transport: Arc<dyn RealtimeTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Arc<Self> {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(EngineState::empty()));

        // Actor loop thread (single threaded "engine actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::EngineCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                api,
                transport,
                tokens,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }
}
