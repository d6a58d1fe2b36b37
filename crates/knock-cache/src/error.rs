//! Errors returned by [`LoadingCache::get`](crate::LoadingCache::get).

use std::sync::Arc;
use std::time::Duration;

/// Reasons a cache read produced no value.
///
/// Every caller that waited on the same load receives a clone of the same
/// error, which is why loader errors are shared behind an `Arc`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The loader returned an error.
    #[error("load failed: {0}")]
    Load(#[source] Arc<E>),

    /// The loader did not finish within the configured load timeout.
    #[error("load timed out after {0:?}")]
    Timeout(Duration),

    /// The load task ended without publishing a result.
    #[error("load was aborted before producing a result")]
    Aborted,

    /// The cache has been closed.
    #[error("cache is closed")]
    Closed,
}

impl<E> CacheError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Returns the loader error, if this is a load failure.
    pub fn load_error(&self) -> Option<&E> {
        match self {
            Self::Load(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl<E> Clone for CacheError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::Load(err) => Self::Load(Arc::clone(err)),
            Self::Timeout(limit) => Self::Timeout(*limit),
            Self::Aborted => Self::Aborted,
            Self::Closed => Self::Closed,
        }
    }
}
