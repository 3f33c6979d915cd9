//! Shared setup for the runnable demos under `examples/`.
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init_tracing() {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("surge=debug")),
        )
        .init();
}

/// Base URL of the target, `MOCK_URL` or a local mock-service.
pub fn target() -> String {
    std::env::var("MOCK_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string())
}
