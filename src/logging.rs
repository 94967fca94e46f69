//! Tracing subscriber setup for the binary.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Level used when neither `--log-level` nor `RUST_LOG` is given.
pub const DEFAULT_LEVEL: &str = "warn";

/// Installs a `fmt` subscriber writing to stderr, keeping stdout for CSV.
///
/// `level` takes precedence over `RUST_LOG`. Calling this more than once is a
/// no-op.
pub fn init(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}
