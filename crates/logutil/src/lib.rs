//! Utilities for logging.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install a global subscriber.
///
/// `level` is the default directive, `RUST_LOG` takes precedence. Does
/// nothing if a global subscriber has already been set.
pub fn configure_global_logger(level: Level, format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let _ = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
}

static TEST_INIT: Once = Once::new();

/// Install a subscriber writing through the test harness.
pub fn init_test() {
    TEST_INIT.call_once(|| {
        let env_filter = EnvFilter::builder()
            .with_default_directive(Level::DEBUG.into())
            .from_env_lossy();
        let subscriber = FmtSubscriber::builder()
            .with_test_writer()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
