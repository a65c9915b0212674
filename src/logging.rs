//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and tests that
//! want to see them call [`init_tracing`] once at startup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already set, so calling it
/// more than once is harmless.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_FILTER)
}

/// Like [`init_tracing`] with a custom fallback filter, e.g.
/// `"warn,batch_engine=debug"`.
pub fn init_tracing_with(default_filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("batch engine tracing initialized");
    }
    installed
}
