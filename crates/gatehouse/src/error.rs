//! Unified error type for the Gatehouse server.

use gatehouse_auth::{ConfigError, TokenError};
use gatehouse_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `gatehouse` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    /// A transport-level error (bind, upgrade, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Issuing or verifying a token failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Startup configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A message was addressed to an identity with no live connection.
    #[error("{0} is not connected")]
    NotConnected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::HandshakeFailed("gone".into());
        let gatehouse_err: GatehouseError = err.into();
        assert!(matches!(gatehouse_err, GatehouseError::Transport(_)));
        assert!(gatehouse_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_token_error() {
        let gatehouse_err: GatehouseError = TokenError::Expired.into();
        assert!(matches!(gatehouse_err, GatehouseError::Token(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::Missing("GATEHOUSE_TOKEN_SECRET");
        let gatehouse_err: GatehouseError = err.into();
        assert!(matches!(gatehouse_err, GatehouseError::Config(_)));
    }

    #[test]
    fn test_not_connected_names_identity() {
        let err = GatehouseError::NotConnected("bob".into());
        assert_eq!(err.to_string(), "bob is not connected");
    }
}
