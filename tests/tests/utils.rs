use std::sync::OnceLock;
use tracing::error;

/// Install the panic hook once and start a fresh mock service on the current runtime.
///
/// Returns the service's base URL. Each test gets its own service since the server task dies with
/// the test's runtime. Logs are captured by `#[traced_test]`.
#[allow(unused)]
pub async fn init() -> String {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));
    });

    let addr = mock_service::spawn()
        .await
        .expect("mock service failed to bind");
    format!("http://{addr}")
}
