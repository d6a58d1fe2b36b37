//! Authorization queries against the knock service.
//!
//! The service is asked one question per origin:
//!
//! ```text
//! POST {server}/query
//! {"svcname": "...", "svcsecret": "...", "userip": "203.0.113.5"}
//!
//! 200 OK
//! {"ok": true}
//! ```
//!
//! Any status other than 200 is a failure and the response body is kept as
//! the error message.

use std::time::Duration;

use async_trait::async_trait;
use knock_cache::{Loaded, Loader};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, GateConfig};
use crate::key::OriginKey;
use crate::verdict::Verdict;

/// Errors from a single authorization query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request could not be built, sent, or its body read.
    #[error("authorization request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-200 status.
    #[error("authorization service returned {status}: {body}")]
    Rejected {
        /// Response status.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },

    /// A 200 response whose body is not `{"ok": bool}`.
    #[error("malformed authorization response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    svcname: &'a str,
    svcsecret: &'a str,
    userip: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    ok: bool,
}

/// Loads verdicts from the authorization service.
///
/// Grants are cached for `granted_ttl`, denials for `denied_ttl`.
#[derive(Clone)]
pub struct AuthorizationLoader {
    client: reqwest::Client,
    query_url: String,
    svcname: String,
    svcsecret: String,
    granted_ttl: Duration,
    denied_ttl: Duration,
}

impl AuthorizationLoader {
    /// Creates a loader with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.load_timeout)
            .timeout(config.load_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("HTTP client: {e}")))?;
        Self::with_client(client, config)
    }

    /// Creates a loader that sends queries through `client`.
    pub fn with_client(client: reqwest::Client, config: &GateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            client,
            query_url: config.query_url(),
            svcname: config.svcname.clone(),
            svcsecret: config.svcsecret.clone(),
            granted_ttl: config.granted_ttl,
            denied_ttl: config.denied_ttl,
        })
    }

    /// Asks the service whether `key` is authorized, without caching.
    ///
    /// # Errors
    ///
    /// See [`QueryError`].
    pub async fn query(&self, key: &OriginKey) -> Result<Verdict, QueryError> {
        let request = QueryRequest {
            svcname: &self.svcname,
            svcsecret: &self.svcsecret,
            userip: key.as_str(),
        };

        let response = self
            .client
            .post(&self.query_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(QueryError::Rejected { status, body });
        }

        let parsed: QueryResponse = serde_json::from_str(&body)?;
        Ok(Verdict::from_granted(parsed.ok))
    }

    /// Cache lifetime for a verdict.
    pub fn ttl_for(&self, verdict: Verdict) -> Duration {
        match verdict {
            Verdict::Authorized => self.granted_ttl,
            Verdict::Denied => self.denied_ttl,
        }
    }
}

#[async_trait]
impl Loader<OriginKey, Verdict> for AuthorizationLoader {
    type Error = QueryError;

    async fn load(&self, key: &OriginKey) -> Result<Loaded<Verdict>, QueryError> {
        let verdict = self.query(key).await?;
        let ttl = self.ttl_for(verdict);
        match verdict {
            Verdict::Authorized => tracing::info!(ip = %key, ttl_secs = ttl.as_secs(), "Granted access"),
            Verdict::Denied => {
                tracing::debug!(ip = %key, verdict = %verdict, ttl_secs = ttl.as_secs(), "Access denied")
            }
        }
        Ok(Loaded::new(verdict, ttl))
    }
}
