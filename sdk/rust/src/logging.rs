//! Tracing setup for applications using the SDK.

use qline_core::{SdkError, SdkResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "qline=info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Fails with a configuration error if a global subscriber is already set.
pub fn init_tracing() -> SdkResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| SdkError::configuration(format!("failed to install tracing subscriber: {e}")))
}
