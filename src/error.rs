use thiserror::Error;

/// REST call failures. Recoverable: callers keep last-known-good state and
/// retry only on explicit user action.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not authenticated")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response payload: {0}")]
    Decode(String),
}

/// Realtime channel failures. Never fatal: the engine drops to degraded mode
/// (manual/REST refresh) and keeps working.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    #[error("channel auth failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no realtime transport configured")]
    Unavailable,
}

/// Synchronous send preconditions, checked before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("{reason}")]
    PermissionDenied { reason: String },
    #[error("message has no text or image")]
    EmptyMessage,
}
