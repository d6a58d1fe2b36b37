//! The loader strategy a [`LoadingCache`](crate::LoadingCache) is built with.

use std::time::Duration;

use async_trait::async_trait;

/// A freshly loaded value and the time it may be served from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<V> {
    /// The loaded value.
    pub value: V,

    /// How long the value stays valid, counted from the end of the load.
    pub ttl: Duration,
}

impl<V> Loaded<V> {
    /// Creates a loaded value with its time-to-live.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self { value, ttl }
    }
}

/// Computes the value for a key on a cache miss.
///
/// The cache guarantees that at most one `load` call is running per key at
/// any moment. Errors are delivered to every caller waiting on that load and
/// are never stored.
///
/// # Example
///
/// ```ignore
/// struct Doubler;
///
/// #[async_trait]
/// impl Loader<u32, u32> for Doubler {
///     type Error = std::io::Error;
///
///     async fn load(&self, key: &u32) -> Result<Loaded<u32>, Self::Error> {
///         Ok(Loaded::new(key * 2, Duration::from_secs(60)))
///     }
/// }
/// ```
#[async_trait]
pub trait Loader<K, V>: Send + Sync + 'static
where
    K: Send + Sync,
{
    /// Error returned when a value cannot be produced.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the value for `key` and chooses its TTL.
    async fn load(&self, key: &K) -> Result<Loaded<V>, Self::Error>;
}
