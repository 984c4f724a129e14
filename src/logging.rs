use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default level directive for this crate; `Config::log_directive` starts
/// from it and `RUST_LOG` still overrides both.
pub const DEFAULT_DIRECTIVE: &str = "cct_consolidator=info";

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "consolidator.log";

/// Initializes console output plus a daily-rotated JSON file under `logs/`.
pub fn init_logging(directive: &str) {
    let _ = fs::create_dir_all(LOG_DIR);

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    // A malformed configured directive falls back to the crate default
    // rather than silencing everything.
    let directive = directive
        .parse()
        .unwrap_or_else(|_| DEFAULT_DIRECTIVE.parse().unwrap());

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(file_layer)
        .with(console_layer)
        .init();

    // The guard must outlive the process for logs to keep flushing.
    std::mem::forget(guard);
}
