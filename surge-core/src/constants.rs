use std::time::Duration;

/// Interval at which the scheduler re-evaluates the target concurrency.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Pause each virtual user takes between two scenario iterations.
pub const DEFAULT_ITERATION_PAUSE: Duration = Duration::from_secs(1);

/// Per-request timeout used by the HTTP executor.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How often the run loop logs a progress line.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_BASE_URL: &str = "https://console.svc.plus";
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.svc.plus";

/// Process exit code when every threshold passed.
pub const EXIT_PASSED: u8 = 0;
/// Process exit code when at least one threshold failed.
pub const EXIT_THRESHOLD_FAILED: u8 = 1;
/// Process exit code for startup and configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 2;
