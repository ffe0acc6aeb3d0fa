// crates/observability/src/lib.rs
//! Tracing setup for the status line binary.
//!
//! Stdout belongs to the rendered line, so diagnostics go to a daily rolling
//! file under the user cache dir. If that dir cannot be created, logging is
//! simply off.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Env var holding the filter directives, e.g. `STATUSBAR_LOG=debug`.
pub const LOG_ENV_VAR: &str = "STATUSBAR_LOG";
pub const LOG_FILE_PREFIX: &str = "statusbar.log";
const DEFAULT_FILTER: &str = "warn";

/// Filter from `STATUSBAR_LOG`, falling back to `warn` when unset or invalid.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber writing to the default log dir.
///
/// Keep the returned guard alive until exit; dropping it flushes the writer.
pub fn init_tracing() -> Option<WorkerGuard> {
    let dir = claude_statusbar_core::paths::log_dir()?;
    init_tracing_in(&dir)
}

/// Same as [`init_tracing`] with an explicit log dir.
pub fn init_tracing_in(dir: &Path) -> Option<WorkerGuard> {
    std::fs::create_dir_all(dir).ok()?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .compact()
        .try_init()
        .ok()?;
    Some(guard)
}
