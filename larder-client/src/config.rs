//! Configuration loading for the LARDER client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use larder_storage::{CacheConfig, ImageConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Project URL of the hosted backend, e.g. `https://abc.supabase.co`.
    pub api_base_url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    pub request_timeout_ms: u64,
    /// Object storage bucket holding recipe images.
    pub image_bucket: String,
    /// Where password reset emails send the user back to.
    pub password_reset_redirect: Option<String>,
    pub cache: CacheSettings,
    pub refresh: RefreshConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub max_staleness_ms: u64,
    pub image_url_stale_ms: u64,
    pub signed_url_ttl_secs: u64,
}

/// Background session refresh with retry backoff.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    pub enabled: bool,
    /// Refresh this long before the access token expires.
    pub margin_secs: u64,
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl RefreshConfig {
    pub fn margin(&self) -> Duration {
        Duration::from_secs(self.margin_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info,larder_storage=debug`.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or LARDER_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("api_base_url", "must be an http(s) URL"));
        }
        if self.anon_key.trim().is_empty() {
            return Err(invalid("anon_key", "must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.image_bucket.trim().is_empty() {
            return Err(invalid("image_bucket", "must not be empty"));
        }
        if self
            .password_reset_redirect
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(invalid("password_reset_redirect", "must not be empty when set"));
        }
        if self.cache.max_staleness_ms == 0 {
            return Err(invalid("cache.max_staleness_ms", "must be > 0"));
        }
        if self.cache.image_url_stale_ms == 0 {
            return Err(invalid("cache.image_url_stale_ms", "must be > 0"));
        }
        if self.cache.signed_url_ttl_secs == 0 {
            return Err(invalid("cache.signed_url_ttl_secs", "must be > 0"));
        }
        if self.cache.signed_url_ttl_secs.saturating_mul(1000) <= self.cache.image_url_stale_ms {
            return Err(invalid(
                "cache.signed_url_ttl_secs",
                "must outlive cache.image_url_stale_ms",
            ));
        }
        if self.refresh.initial_ms == 0 {
            return Err(invalid("refresh.initial_ms", "must be > 0"));
        }
        if self.refresh.max_ms < self.refresh.initial_ms {
            return Err(invalid("refresh.max_ms", "must be >= refresh.initial_ms"));
        }
        if self.refresh.multiplier.is_nan() || self.refresh.multiplier < 1.0 {
            return Err(invalid("refresh.multiplier", "must be >= 1.0"));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(invalid("logging.filter", "must not be empty"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new().with_max_staleness(Duration::from_millis(self.cache.max_staleness_ms))
    }

    pub fn image_config(&self) -> ImageConfig {
        ImageConfig {
            max_staleness: Duration::from_millis(self.cache.image_url_stale_ms),
            url_ttl: Duration::from_secs(self.cache.signed_url_ttl_secs),
        }
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("LARDER_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
api_base_url = "https://abc.supabase.co/"
anon_key = "anon"
request_timeout_ms = 10000
image_bucket = "recipe-images"
password_reset_redirect = "https://app.example.com/update-password"

[cache]
max_staleness_ms = 60000
image_url_stale_ms = 2700000
signed_url_ttl_secs = 3600

[refresh]
enabled = true
margin_secs = 60
initial_ms = 500
max_ms = 30000
multiplier = 2.0
jitter_ms = 250

[logging]
filter = "info"
json = false
"#;

    #[test]
    fn test_valid_config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = ClientConfig::from_path(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.base_url(), "https://abc.supabase.co");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.image_config(), ImageConfig::default());
        assert_eq!(
            config.cache_config().default_max_staleness,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let text = VALID.replace("json = false", "json = false\ncolour = true");
        assert!(matches!(
            ClientConfig::from_toml(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_field_rejected() {
        let text = VALID.replace("image_bucket = \"recipe-images\"\n", "");
        assert!(ClientConfig::from_toml(&text).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ("anon_key = \"anon\"", "anon_key = \" \"", "anon_key"),
            ("request_timeout_ms = 10000", "request_timeout_ms = 0", "request_timeout_ms"),
            ("https://abc.supabase.co/", "ftp://abc", "api_base_url"),
            (
                "signed_url_ttl_secs = 3600",
                "signed_url_ttl_secs = 60",
                "cache.signed_url_ttl_secs",
            ),
            ("filter = \"info\"", "filter = \"\"", "logging.filter"),
            ("multiplier = 2.0", "multiplier = 0.5", "refresh.multiplier"),
            ("max_ms = 30000", "max_ms = 100", "refresh.max_ms"),
        ];
        for (from, to, expected) in cases {
            let config = ClientConfig::from_toml(&VALID.replace(from, to)).unwrap();
            match config.validate() {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
