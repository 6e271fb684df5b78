//! Tracing setup for the server binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "info,plant_catalog=debug";

/// Initialize console logging.
///
/// Level is controlled by `RUST_LOG`, e.g. `RUST_LOG=warn` or
/// `RUST_LOG=plant_catalog=trace,warp=info`.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}
