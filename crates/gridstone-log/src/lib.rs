//! Structured logging for the Gridstone engine.
//!
//! Thin bootstrap over the `tracing` ecosystem: console output with uptime
//! timestamps and module targets, plus optional JSON file logging for
//! post-mortem analysis of server runs. Respects `RUST_LOG`.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter applied when neither `RUST_LOG` nor an explicit filter is
/// given. Worker threads log chunk traffic at `debug`, so the default stays
/// at `info` to keep server consoles readable.
const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` — optional directory for a JSON log file (`gridstone.log`).
/// * `filter` — optional filter string overriding [`DEFAULT_FILTER`];
///   `RUST_LOG` wins over both.
///
/// Call once at process start; later calls are ignored by the subscriber
/// registry.
pub fn init_logging(log_dir: Option<&Path>, filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(dir) = log_dir
        && std::fs::create_dir_all(dir).is_ok()
        && let Ok(file) = std::fs::File::create(dir.join("gridstone.log"))
    {
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();
        let _ = subscriber.with(file_layer).try_init();
        return;
    }

    let _ = subscriber.try_init();
}

/// An `EnvFilter` with the default filter string, for tests that want
/// consistent behavior without touching the process environment.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
