//! # knock-gate
//!
//! Origin authorization gate for HTTP services.
//!
//! Every request is keyed by the IP address it came from. The gate asks a
//! remote authorization service whether that address is currently allowed
//! and either lets the request through or redirects it to the service so the
//! client can "knock" first. Verdicts are cached per address: grants for a
//! long time, denials only briefly so a freshly authorized client is let in
//! quickly.
//!
//! ## Modules
//!
//! - [`config`] - Gate settings and their validation
//! - [`key`] - Deriving the cache key from the peer address
//! - [`verdict`] - The authorization outcome
//! - [`loader`] - Querying the authorization service
//! - [`gate`] - The gate itself and its axum middleware
//! - [`error`] - Request-level errors
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{Router, middleware};
//! use knock_gate::{GateConfig, KnockGate, knock_middleware};
//!
//! let gate = Arc::new(KnockGate::new(&config)?);
//! let app = Router::new()
//!     .fallback(upstream)
//!     .layer(middleware::from_fn_with_state(gate.clone(), knock_middleware));
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod key;
pub mod loader;
pub mod verdict;

pub use config::{ConfigError, GateConfig};
pub use error::GateError;
pub use gate::{CHALLENGE_BODY, KnockGate, VerdictCache, knock_middleware};
pub use key::{KeyError, OriginKey};
pub use loader::{AuthorizationLoader, QueryError};
pub use verdict::Verdict;

pub use knock_cache::{CacheError, CacheStats};
