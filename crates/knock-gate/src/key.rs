//! Cache keys derived from the peer address.

use std::fmt;

/// Errors raised when a peer address cannot be split into host and port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The address has no `:port` suffix.
    #[error("address {0}: missing port in address")]
    MissingPort(String),

    /// An unbracketed address contains more than one colon.
    #[error("address {0}: too many colons in address")]
    TooManyColons(String),

    /// A `[` without a matching `]`.
    #[error("address {0}: missing ']' in address")]
    MissingBracket(String),

    /// Brackets where none are allowed.
    #[error("address {0}: unexpected bracket in address")]
    UnexpectedBracket(String),

    /// Nothing before the port separator.
    #[error("address {0}: empty host")]
    EmptyHost(String),
}

/// The authorization subject: the origin's host with the port removed.
///
/// `203.0.113.5:54321` and `203.0.113.5:1024` map to the same key, so all
/// connections from one address share a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginKey(String);

impl OriginKey {
    /// Splits a `host:port` or `[host]:port` address and keeps the host.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] when the address has no port, is an unbracketed
    /// IPv6 literal, has unbalanced brackets, or has an empty host.
    pub fn from_remote_addr(addr: &str) -> Result<Self, KeyError> {
        let host = match addr.strip_prefix('[') {
            Some(rest) => {
                let (host, after) = rest
                    .split_once(']')
                    .ok_or_else(|| KeyError::MissingBracket(addr.to_string()))?;
                let Some(port) = after.strip_prefix(':') else {
                    return Err(KeyError::MissingPort(addr.to_string()));
                };
                if port.contains(':') {
                    return Err(KeyError::TooManyColons(addr.to_string()));
                }
                if port.contains(['[', ']']) || host.contains('[') {
                    return Err(KeyError::UnexpectedBracket(addr.to_string()));
                }
                host
            }
            None => {
                let (host, _port) = addr
                    .rsplit_once(':')
                    .ok_or_else(|| KeyError::MissingPort(addr.to_string()))?;
                if host.contains(':') {
                    return Err(KeyError::TooManyColons(addr.to_string()));
                }
                if addr.contains(['[', ']']) {
                    return Err(KeyError::UnexpectedBracket(addr.to_string()));
                }
                host
            }
        };

        if host.is_empty() {
            return Err(KeyError::EmptyHost(addr.to_string()));
        }
        Ok(Self(host.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_port_is_stripped() {
        let key = OriginKey::from_remote_addr("203.0.113.5:54321").unwrap();
        assert_eq!(key.as_str(), "203.0.113.5");
        assert_eq!(key.to_string(), "203.0.113.5");
    }

    #[test]
    fn test_same_host_different_ports_share_key() {
        let a = OriginKey::from_remote_addr("203.0.113.5:1024").unwrap();
        let b = OriginKey::from_remote_addr("203.0.113.5:65000").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bracketed_ipv6() {
        let key = OriginKey::from_remote_addr("[2001:db8::1]:8080").unwrap();
        assert_eq!(key.as_str(), "2001:db8::1");

        let scoped = OriginKey::from_remote_addr("[fe80::1%eth0]:443").unwrap();
        assert_eq!(scoped.as_str(), "fe80::1%eth0");
    }

    #[test]
    fn test_hostname() {
        let key = OriginKey::from_remote_addr("localhost:3000").unwrap();
        assert_eq!(key.as_str(), "localhost");
    }

    #[test]
    fn test_missing_port() {
        assert_eq!(
            OriginKey::from_remote_addr("203.0.113.5"),
            Err(KeyError::MissingPort("203.0.113.5".to_string()))
        );
        assert!(matches!(
            OriginKey::from_remote_addr("[::1]"),
            Err(KeyError::MissingPort(_))
        ));
    }

    #[test]
    fn test_unbracketed_ipv6_is_rejected() {
        assert!(matches!(
            OriginKey::from_remote_addr("2001:db8::1"),
            Err(KeyError::TooManyColons(_))
        ));
    }

    #[test]
    fn test_malformed_brackets() {
        assert!(matches!(
            OriginKey::from_remote_addr("[::1:80"),
            Err(KeyError::MissingBracket(_))
        ));
        assert!(matches!(
            OriginKey::from_remote_addr("host]:80"),
            Err(KeyError::UnexpectedBracket(_))
        ));
        assert!(matches!(
            OriginKey::from_remote_addr("[::1]x80"),
            Err(KeyError::MissingPort(_))
        ));
        assert!(matches!(
            OriginKey::from_remote_addr("[::1]:80:90"),
            Err(KeyError::TooManyColons(_))
        ));
    }

    #[test]
    fn test_empty_host() {
        assert!(matches!(
            OriginKey::from_remote_addr(":80"),
            Err(KeyError::EmptyHost(_))
        ));
        assert!(matches!(
            OriginKey::from_remote_addr(""),
            Err(KeyError::MissingPort(_))
        ));
    }

    #[test]
    fn test_error_message_names_address() {
        let err = OriginKey::from_remote_addr("10.0.0.1").unwrap_err();
        assert_eq!(err.to_string(), "address 10.0.0.1: missing port in address");
    }
}
