//! Shared error type across promtunnel crates.

use std::net::SocketAddr;

use thiserror::Error;

/// Coarse error classes (stable, used as a structured log field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Config file unreadable, malformed, or out of range.
    Config,
    /// Metric could not be registered with the collector registry.
    Registration,
    /// Listener could not be bound.
    Bind,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// String representation used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::Registration => "REGISTRATION",
            ErrorKind::Bind => "BIND",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TunnelError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("metric registration failed: {0}")]
    Registration(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("internal: {0}")]
    Internal(String),
}

impl TunnelError {
    /// Map the error to its stable class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TunnelError::BadConfig(_) | TunnelError::UnsupportedVersion => ErrorKind::Config,
            TunnelError::Registration(_) => ErrorKind::Registration,
            TunnelError::Bind { .. } => ErrorKind::Bind,
            TunnelError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_is_a_config_error() {
        assert_eq!(TunnelError::UnsupportedVersion.kind(), ErrorKind::Config);
        assert_eq!(TunnelError::UnsupportedVersion.kind().as_str(), "CONFIG");
    }

    #[test]
    fn bind_error_keeps_address_and_source() {
        let err = TunnelError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(err.kind(), ErrorKind::Bind);
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:9090: address in use");
        assert!(std::error::Error::source(&err).is_some());
    }
}
