//! Error types for the client crate.

use crate::api_client::ApiClientError;
use crate::config::ConfigError;
use larder_core::LarderError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Larder(#[from] LarderError),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}
