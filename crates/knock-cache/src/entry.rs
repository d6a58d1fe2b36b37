//! Stored cache entries.

use std::time::Duration;

use tokio::time::Instant;

/// A value together with the moment it was loaded and how long it stays valid.
///
/// Entries are never modified once written. A reload replaces the entry.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    loaded_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            loaded_at: Instant::now(),
            ttl,
        }
    }

    /// `loaded_at + ttl`, or `None` when the sum does not fit in an `Instant`.
    pub(crate) fn expires_at(&self) -> Option<Instant> {
        self.loaded_at.checked_add(self.ttl)
    }

    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at() {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let entry = CacheEntry::new("v", Duration::from_secs(10));
        assert!(!entry.is_expired_at(Instant::now()));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!entry.is_expired_at(Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(entry.is_expired_at(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_immediately_expired() {
        let entry = CacheEntry::new(1u8, Duration::ZERO);
        assert!(entry.is_expired_at(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_deadline_never_expires() {
        let entry = CacheEntry::new(1u8, Duration::MAX);
        assert!(entry.expires_at().is_none());
        assert!(!entry.is_expired_at(Instant::now()));
    }
}
