//! Request-level gate errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use knock_cache::CacheError;

use crate::key::KeyError;
use crate::loader::QueryError;

/// Why the gate could neither forward nor challenge a request.
///
/// There is no fallback verdict: every error becomes an error response.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The host did not attach the peer address to the request.
    #[error("remote address unavailable")]
    MissingRemoteAddr,

    /// The peer address could not be split into host and port.
    #[error(transparent)]
    KeyDerivation(#[from] KeyError),

    /// The verdict could not be obtained.
    #[error("authorization check failed: {0}")]
    Authorization(#[from] CacheError<QueryError>),
}

impl GateError {
    /// Status code this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingRemoteAddr => StatusCode::INTERNAL_SERVER_ERROR,
            Self::KeyDerivation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(CacheError::Load(_)) => StatusCode::BAD_GATEWAY,
            Self::Authorization(CacheError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Authorization(CacheError::Aborted | CacheError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// The authorization service's error, if the query itself failed.
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Self::Authorization(err) => err.load_error(),
            _ => None,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Authorization gate error");
        } else {
            tracing::debug!(error = %self, "Rejected request at authorization gate");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn rejected(body: &str) -> GateError {
        GateError::Authorization(CacheError::Load(Arc::new(QueryError::Rejected {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: body.to_string(),
        })))
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GateError::MissingRemoteAddr.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GateError::from(KeyError::MissingPort("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(rejected("boom").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            GateError::from(CacheError::Timeout(Duration::from_secs(5))).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GateError::from(CacheError::Closed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_message_keeps_service_body() {
        let err = rejected("internal error");
        assert!(err.to_string().contains("internal error"));
        assert!(matches!(
            err.query_error(),
            Some(QueryError::Rejected { body, .. }) if body == "internal error"
        ));
    }

    #[test]
    fn test_key_error_is_transparent() {
        let err = GateError::from(KeyError::MissingPort("10.0.0.1".into()));
        assert_eq!(err.to_string(), "address 10.0.0.1: missing port in address");
        assert!(err.query_error().is_none());
    }
}
