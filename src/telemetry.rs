//! Tracing bootstrap for embedding applications.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

/// Environment variable consulted for log filtering.
pub const LOG_ENV_VAR: &str = "CAMPUSMAIL_LOG";

/// Installs the global tracing subscriber: pretty human-readable output in
/// debug builds, JSON lines otherwise, filtered through `CAMPUSMAIL_LOG`
/// with an `info` default.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    #[cfg(debug_assertions)]
    let _ = FmtSubscriber::builder()
        .pretty()
        .with_env_filter(filter)
        .finish()
        .try_init();

    #[cfg(not(debug_assertions))]
    let _ = FmtSubscriber::builder()
        .json()
        .with_env_filter(filter)
        .finish()
        .try_init();
}
