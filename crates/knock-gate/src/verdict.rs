//! The authorization outcome for one origin.

use std::fmt;

/// Whether an origin may pass the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The origin is allowed; requests are forwarded.
    Authorized,
    /// The origin is not allowed; requests are redirected to the
    /// authorization service.
    Denied,
}

impl Verdict {
    /// Maps the service's `ok` flag to a verdict.
    pub fn from_granted(granted: bool) -> Self {
        if granted { Self::Authorized } else { Self::Denied }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorized => write!(f, "authorized"),
            Self::Denied => write!(f, "denied"),
        }
    }
}
