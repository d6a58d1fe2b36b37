//! Forwards authorized requests to the configured upstream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, instrument};

use crate::config::ServerConfig;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Errors raised while proxying a request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to reach upstream: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!(error = %self, status = status.as_u16(), "Proxy request failed");
        (status, self.to_string()).into_response()
    }
}

/// The upstream that authorized traffic is forwarded to.
pub struct Upstream {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
    body_limit: usize,
}

impl Upstream {
    pub fn new(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &ServerConfig) -> Self {
        Self {
            client,
            base: config.upstream.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.proxy_timeout_ms),
            body_limit: config.body_limit_bytes,
        }
    }

    fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }
}

/// Fallback handler: replays the request against the upstream.
#[instrument(skip_all, fields(method = %request.method(), uri = %request.uri()))]
pub async fn forward(
    State(upstream): State<Arc<Upstream>>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = upstream.target(path_and_query);

    let mut headers = forwarded_headers(&parts.headers);
    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        append_forwarded_for(&mut headers, *peer);
    }

    let body = axum::body::to_bytes(body, upstream.body_limit)
        .await
        .map_err(ProxyError::RequestBody)?;

    let reply = upstream
        .client
        .request(parts.method, &target)
        .headers(headers)
        .body(body)
        .timeout(upstream.timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProxyError::Timeout(upstream.timeout)
            } else {
                ProxyError::Upstream(e)
            }
        })?;

    let status = reply.status();
    debug!(target = %target, status = %status, "Upstream responded");

    let mut builder = Response::builder().status(status);
    for (name, value) in reply.headers() {
        if !is_hop_by_hop_header(name.as_str()) {
            builder = builder.header(name, value);
        }
    }
    let bytes = reply.bytes().await.map_err(ProxyError::Upstream)?;
    Ok(builder.body(Body::from(bytes))?)
}

fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        if is_hop_by_hop_header(name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {}", peer.ip()),
        None => peer.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::try_from(value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

/// Hop-by-hop headers (RFC 7230 section 6.1) plus `host`, which is set by
/// the client for the upstream.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}
