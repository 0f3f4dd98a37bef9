use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Builds the root logger: JSON lines on stderr, written from a
/// background thread.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);

    // with `env_logging`, `RUST_LOG` decides which records reach the drain
    #[cfg(feature = "env_logging")]
    let drain = slog_envlogger::new(drain).fuse();

    let drain = Async::new(drain).build().fuse();

    Logger::root(drain, root_values())
}

/// A logger that drops everything. Used by tests and helpers that don't
/// want output.
pub fn discard() -> Logger {
    Logger::root(Discard, root_values())
}

fn root_values() -> slog::OwnedKV<impl slog::SendSyncRefUnwindSafeKV> {
    o!(
        "service" => info::SERVICE,
        "version" => info::VERSION,
        "revision" => info::REVISION,
        "build_timestamp" => info::BUILD_TIMESTAMP,
    )
}
