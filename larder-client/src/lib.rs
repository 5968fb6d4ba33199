//! LARDER client: HTTP adapters for the hosted backend and the `Larder`
//! facade that wires them to the cache and mutation coordinator.

pub mod api_client;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod objects;
pub mod rest;
pub mod telemetry;

pub use api_client::{ApiClient, ApiClientError, ErrorContext};
pub use app::Larder;
pub use auth::{AuthClient, AutoRefresh};
pub use config::{CacheSettings, ClientConfig, ConfigError, LoggingConfig, RefreshConfig};
pub use error::ClientError;
pub use objects::RestObjectStore;
pub use rest::RestRecordStore;
pub use telemetry::init_tracing;
