//! Tracing subscriber setup for the workspace binaries.
//!
//! Library code only emits `tracing` events; each binary calls
//! [`init_tracing`] once at start-up. The filter defaults to `info` and can be
//! overridden with `RUST_LOG` (e.g. `RUST_LOG=options_flow=debug`).

use tracing_subscriber::EnvFilter;

/// Default filter directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber writing to stderr, leaving stdout to
/// command output. Calling it twice is harmless; the second
/// call is ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
