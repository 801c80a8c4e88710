use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

pub fn initialize_logger() -> slog::Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!("version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    )
}

/// Routes `log` records from dependencies (warp, sqlx) through an
/// env-filtered slog drain. Keep the guard alive for the life of the
/// process.
#[cfg(feature = "env_logging")]
pub fn initialize_env_logging() -> Result<slog_scope::GlobalLoggerGuard, String> {
    slog_envlogger::init().map_err(|e| format!("initialize slog-envlogger: {}", e))
}

/// A logger that drops everything, for contexts without a configured drain.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
