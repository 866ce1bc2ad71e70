//! Tracing subscriber setup for binaries and tests embedding streamio.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,streamio=debug";

/// Install a global subscriber with the default filter.
///
/// Does nothing if a subscriber is already installed.
pub fn init() {
    let _ = try_init(DEFAULT_FILTER);
}

/// Install a global subscriber, preferring `RUST_LOG` over `default_directive`.
///
/// Fails if a global subscriber is already set.
pub fn try_init(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
