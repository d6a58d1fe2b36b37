//! Gate configuration.

use std::fmt;
use std::time::Duration;

use knock_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required option is missing or empty.
    #[error("missing `{0}`")]
    Missing(&'static str),

    /// An option has an unusable value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Settings for the authorization gate.
///
/// `server`, `svcname` and `svcsecret` are required. The remaining options
/// have defaults tuned for the asymmetric grant/deny lifetimes.
///
/// # Example (TOML)
///
/// ```toml
/// [knock]
/// server = "https://knock.example.com"
/// svcname = "wiki"
/// svcsecret = "s3cret"
/// granted_ttl = "1h"
/// denied_ttl = "10s"
/// ```
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Base URL of the authorization service. Queries go to `{server}/query`
    /// and denied clients are redirected to `{server}/`.
    pub server: String,

    /// Name this service is registered under.
    pub svcname: String,

    /// Shared secret for this service.
    pub svcsecret: String,

    /// How long a grant is cached.
    #[serde(with = "humantime_serde")]
    pub granted_ttl: Duration,

    /// How long a denial is cached. Keep this short so newly authorized
    /// clients get through quickly.
    #[serde(with = "humantime_serde")]
    pub denied_ttl: Duration,

    /// Upper bound for one authorization query, shared by every request
    /// waiting on it.
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,

    /// How often expired verdicts are purged.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            svcname: String::new(),
            svcsecret: String::new(),
            granted_ttl: Duration::from_secs(3600), // 1 hour
            denied_ttl: Duration::from_secs(10),
            load_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("server", &self.server)
            .field("svcname", &self.svcname)
            .field("svcsecret", &"[REDACTED]")
            .field("granted_ttl", &self.granted_ttl)
            .field("denied_ttl", &self.denied_ttl)
            .field("load_timeout", &self.load_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl GateConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Missing` if `server`, `svcname` or `svcsecret` is empty
    /// - `ConfigError::InvalidValue` if `server` is not an http(s) URL or the
    ///   load timeout is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::Missing("server"));
        }
        if self.svcname.is_empty() {
            return Err(ConfigError::Missing("svcname"));
        }
        if self.svcsecret.is_empty() {
            return Err(ConfigError::Missing("svcsecret"));
        }

        let url = Url::parse(&self.server).map_err(|e| {
            ConfigError::InvalidValue(format!("server '{}': {}", self.server, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "server '{}' must be an http or https URL",
                self.server
            )));
        }

        if self.load_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "load_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// `server` without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.server.trim_end_matches('/')
    }

    /// Endpoint the authorization query is posted to.
    pub fn query_url(&self) -> String {
        format!("{}/query", self.base_url())
    }

    /// Where denied clients are sent.
    pub fn challenge_location(&self) -> String {
        format!("{}/", self.base_url())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            sweep_interval: self.sweep_interval,
            load_timeout: Some(self.load_timeout),
        }
    }
}
