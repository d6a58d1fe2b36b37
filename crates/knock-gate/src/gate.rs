//! The authorization gate and its axum middleware.
//!
//! ```text
//! request ─→ peer address ─→ OriginKey ─→ cached verdict
//!                                              │
//!                           Authorized ←───────┴───────→ Denied
//!                               │                          │
//!                          next handler        302 Location: {server}/
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use knock_cache::{CacheStats, LoadingCache};

use crate::config::{ConfigError, GateConfig};
use crate::error::GateError;
use crate::key::OriginKey;
use crate::loader::AuthorizationLoader;
use crate::verdict::Verdict;

/// Body sent with the redirect for denied origins.
pub const CHALLENGE_BODY: &str = "knock required";

/// Verdict cache keyed by origin.
pub type VerdictCache = LoadingCache<OriginKey, Verdict, AuthorizationLoader>;

/// Decides per request whether to forward or redirect.
///
/// Owns the verdict cache. Create one per host at startup and call
/// [`close`](Self::close) on shutdown.
pub struct KnockGate {
    cache: VerdictCache,
    location: HeaderValue,
}

impl KnockGate {
    /// Validates `config` and builds the gate with its own HTTP client.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        let loader = AuthorizationLoader::new(config)?;
        Self::with_loader(loader, config)
    }

    /// Builds the gate around an existing loader.
    pub fn with_loader(loader: AuthorizationLoader, config: &GateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let location = HeaderValue::try_from(config.challenge_location()).map_err(|e| {
            ConfigError::InvalidValue(format!("server '{}': {}", config.server, e))
        })?;

        tracing::info!(
            server = %config.base_url(),
            svcname = %config.svcname,
            granted_ttl_secs = config.granted_ttl.as_secs(),
            denied_ttl_secs = config.denied_ttl.as_secs(),
            "Authorization gate ready"
        );

        Ok(Self {
            cache: LoadingCache::new(loader, config.cache_config()),
            location,
        })
    }

    /// Returns the verdict for `key`, querying the service on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Authorization` if the verdict could not be loaded.
    pub async fn verdict(&self, key: &OriginKey) -> Result<Verdict, GateError> {
        Ok(self.cache.get(key).await?)
    }

    /// Derives the key from a `host:port` peer address and returns its verdict.
    ///
    /// # Errors
    ///
    /// Returns `GateError::KeyDerivation` for malformed addresses and
    /// `GateError::Authorization` if the verdict could not be loaded.
    pub async fn check(&self, remote_addr: &str) -> Result<Verdict, GateError> {
        let key = OriginKey::from_remote_addr(remote_addr)?;
        self.verdict(&key).await
    }

    /// Redirect sent to denied origins.
    pub fn challenge(&self) -> Response {
        (
            StatusCode::FOUND,
            [(LOCATION, self.location.clone())],
            CHALLENGE_BODY,
        )
            .into_response()
    }

    /// Stops the cache sweeper and drops cached verdicts. Safe to call twice.
    pub async fn close(&self) {
        self.cache.close().await;
        tracing::info!("Authorization gate closed");
    }

    /// Get verdict cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Middleware that forwards authorized origins and redirects the rest.
///
/// The peer address is taken from `ConnectInfo<SocketAddr>`, so the server
/// must be started with `into_make_service_with_connect_info::<SocketAddr>()`.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .fallback(proxy)
///     .layer(middleware::from_fn_with_state(gate, knock_middleware));
/// ```
pub async fn knock_middleware(
    State(gate): State<Arc<KnockGate>>,
    req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .ok_or(GateError::MissingRemoteAddr)?;

    match gate.check(&peer.to_string()).await? {
        Verdict::Authorized => Ok(next.run(req).await),
        Verdict::Denied => {
            tracing::debug!(
                ip = %peer.ip(),
                path = %req.uri().path(),
                "Challenging request from unauthorized origin"
            );
            Ok(gate.challenge())
        }
    }
}
