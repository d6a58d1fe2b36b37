//! Single-flight bookkeeping: at most one pending load per key.
//!
//! Each pending load is represented by a `watch` channel. The task running the
//! load owns the sender; every caller that missed on the same key holds a
//! receiver and waits for the slot to be filled with the shared result.

use std::hash::Hash;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::error::CacheError;

/// Result delivered to every caller waiting on one load.
pub(crate) type FlightResult<V, E> = Result<V, CacheError<E>>;

type Slot<V, E> = watch::Receiver<Option<FlightResult<V, E>>>;

/// Outcome of trying to claim a key.
pub(crate) enum Claim<V, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// A live value appeared while claiming; no load is needed.
    Ready(V),
    /// Another caller is loading this key; wait on the slot.
    Follow(Slot<V, E>),
    /// The caller now owns the load for this key and must publish its result.
    Lead(watch::Sender<Option<FlightResult<V, E>>>),
}

/// Pending loads keyed by cache key.
pub(crate) struct Flights<K, V, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pending: DashMap<K, Slot<V, E>>,
}

impl<K, V, E> Flights<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Joins the pending load for `key`, or claims it if none exists.
    ///
    /// `recheck` runs while the key's slot is locked and no load is pending. A
    /// load that completed between the caller's miss and this claim has already
    /// stored its value, so `recheck` finds it and no second load starts.
    pub(crate) fn claim(&self, key: &K, recheck: impl FnOnce() -> Option<V>) -> Claim<V, E> {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(slot) => Claim::Follow(slot.get().clone()),
            Entry::Vacant(vacant) => {
                if let Some(value) = recheck() {
                    return Claim::Ready(value);
                }
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx);
                Claim::Lead(tx)
            }
        }
    }

    /// Number of keys with a load in progress.
    pub(crate) fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Waits for the load behind `slot` and returns its shared result.
    pub(crate) async fn wait(mut slot: Slot<V, E>) -> FlightResult<V, E> {
        // A closed channel still exposes the last published value.
        let _ = slot.wait_for(Option::is_some).await;
        let published = slot.borrow().clone();
        published.unwrap_or(Err(CacheError::Aborted))
    }
}

/// Ownership of one pending load.
///
/// Resolving publishes the result after the pending record is discarded, so a
/// caller arriving afterwards starts a fresh load instead of reading a stale
/// failure. Dropping the guard unresolved (the load task panicked or was
/// cancelled) also discards the record; waiters then observe a closed channel.
pub(crate) struct FlightGuard<'a, K, V, E>
where
    K: Eq + Hash,
    E: std::error::Error + Send + Sync + 'static,
{
    flights: &'a Flights<K, V, E>,
    key: &'a K,
    tx: Option<watch::Sender<Option<FlightResult<V, E>>>>,
}

impl<'a, K, V, E> FlightGuard<'a, K, V, E>
where
    K: Eq + Hash,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        flights: &'a Flights<K, V, E>,
        key: &'a K,
        tx: watch::Sender<Option<FlightResult<V, E>>>,
    ) -> Self {
        Self {
            flights,
            key,
            tx: Some(tx),
        }
    }

    pub(crate) fn resolve(mut self, result: FlightResult<V, E>) {
        self.flights.pending.remove(self.key);
        if let Some(tx) = self.tx.take() {
            // send_replace stores the value even when every receiver is gone.
            tx.send_replace(Some(result));
        }
    }
}

impl<K, V, E> Drop for FlightGuard<'_, K, V, E>
where
    K: Eq + Hash,
    E: std::error::Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.flights.pending.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    type TestFlights = Flights<String, u32, Boom>;

    fn lead(claim: Claim<u32, Boom>) -> watch::Sender<Option<FlightResult<u32, Boom>>> {
        match claim {
            Claim::Lead(tx) => tx,
            _ => panic!("expected to lead the load"),
        }
    }

    fn follow(claim: Claim<u32, Boom>) -> Slot<u32, Boom> {
        match claim {
            Claim::Follow(rx) => rx,
            _ => panic!("expected to follow the load"),
        }
    }

    #[tokio::test]
    async fn test_second_claim_follows_first() {
        let flights = TestFlights::new();
        let key = "k".to_string();

        let tx = lead(flights.claim(&key, || None));
        let rx = follow(flights.claim(&key, || None));
        assert_eq!(flights.in_flight(), 1);

        FlightGuard::new(&flights, &key, tx).resolve(Ok(7));
        assert_eq!(flights.in_flight(), 0);
        assert_eq!(TestFlights::wait(rx).await.ok(), Some(7));
    }

    #[tokio::test]
    async fn test_recheck_value_skips_load() {
        let flights = TestFlights::new();
        let key = "k".to_string();

        match flights.claim(&key, || Some(3)) {
            Claim::Ready(v) => assert_eq!(v, 3),
            _ => panic!("expected ready value"),
        }
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_resolved_key_can_be_claimed_again() {
        let flights = TestFlights::new();
        let key = "k".to_string();

        let tx = lead(flights.claim(&key, || None));
        FlightGuard::new(&flights, &key, tx).resolve(Err(CacheError::Load(Boom.into())));

        let _tx = lead(flights.claim(&key, || None));
        assert_eq!(flights.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_dropped_guard_aborts_waiters() {
        let flights = TestFlights::new();
        let key = "k".to_string();

        let tx = lead(flights.claim(&key, || None));
        let rx = follow(flights.claim(&key, || None));

        drop(FlightGuard::new(&flights, &key, tx));

        assert_eq!(flights.in_flight(), 0);
        assert!(matches!(TestFlights::wait(rx).await, Err(CacheError::Aborted)));
    }
}
