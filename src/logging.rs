/// Tracing initialization, called once at the start of `FfiMessenger::new()`.
///
/// Shells embedding the engine over FFI get stderr logs filtered by
/// `RUST_LOG`; the default keeps engine internals at debug and everything
/// else at info.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lettora_core=debug,info".into()),
        )
        .try_init();
}
