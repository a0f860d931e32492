//! Process-wide structured logging, shared by every CLI command.

use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Initialize the global tracing subscriber. Honors `RUST_LOG`/`REACTOR_LOG`,
/// defaulting to `info`. `json` switches the formatter to line-delimited
/// JSON, for callers that want machine-parseable logs (CI, agents).
pub fn init(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_env("REACTOR_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}
