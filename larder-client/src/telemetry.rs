//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::ClientError;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured filter. Returns `Ok(false)` if a
/// subscriber was already installed, which is not an error: tests and
/// embedding applications may have set one up first.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool, ClientError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| ClientError::Telemetry(format!("invalid log filter: {e}")))?,
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
    Ok(installed)
}
