//! # knock-cache
//!
//! Self-loading TTL cache used by the Knock authorization gate.
//!
//! A [`LoadingCache`] is constructed with a [`Loader`] strategy. Reads that find
//! no live entry ask the loader for a fresh value; the loader decides how long
//! that value stays valid by returning a TTL alongside it.
//!
//! ## Behaviour
//!
//! - **Single-flight**: concurrent misses for the same key share one load.
//! - **Per-entry TTL**: every entry expires at `loaded_at + ttl`, with the TTL
//!   chosen by the loader for that particular value.
//! - **No negative caching**: failed loads are handed to every waiter and then
//!   forgotten, so the next read retries.
//! - **Lazy and active expiry**: expired entries are dropped when a read finds
//!   them and by a background sweeper that runs on a fixed interval.
//!
//! ```text
//! get(key) → live entry? ──yes──→ value
//!                 │
//!                 no
//!                 ↓
//!          load in flight? ──yes──→ wait for it
//!                 │
//!                 no
//!                 ↓
//!          spawn load → store (on success) → wake waiters
//! ```

mod cache;
mod entry;
mod error;
mod flight;
mod loader;
mod stats;
mod sweeper;

pub use cache::{CacheConfig, LoadingCache};
pub use error::CacheError;
pub use loader::{Loaded, Loader};
pub use stats::CacheStats;
