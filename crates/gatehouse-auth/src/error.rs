//! Error types for the auth layer.
//!
//! Two levels, on purpose kept apart:
//!
//! - [`TokenError`] says exactly which check a token failed. It is for
//!   local logs only.
//! - [`HandshakeError`] is what the handshake outcome looks like from the
//!   outside. Every token failure collapses into
//!   [`HandshakeError::Unauthorized`], so a client cannot probe which
//!   validation step it tripped.

/// Why a token was refused (or could not be produced).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The string is not a structurally valid token: wrong number of
    /// segments, undecodable header or payload, or claims of the wrong shape.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match the configured secret.
    #[error("token signature does not match")]
    BadSignature,

    /// The token's expiry is not in the future.
    #[error("token expired")]
    Expired,

    /// The token names no subject (or the caller asked to issue one for an
    /// empty subject).
    #[error("token has no subject")]
    MissingSubject,

    /// Signing a new token failed.
    #[error("token encoding failed: {0}")]
    Encode(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                Self::BadSignature
            }
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed,
        }
    }
}

/// Why an upgrade request was refused.
///
/// All three variants lead to the same thing on the wire: the upgrade is
/// refused with 401 and no connection is created.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// No `Authorization` header was sent.
    #[error("authorization header missing")]
    MissingCredential,

    /// The header is present but is not `Bearer <token>`.
    #[error("authorization header is not a bearer credential")]
    WrongScheme,

    /// The bearer token did not verify. The specific [`TokenError`] is kept
    /// as the source for logging and never leaves the process.
    #[error("unauthorized")]
    Unauthorized(#[source] TokenError),
}

/// Invalid or missing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// The signing secret is shorter than the enforced minimum.
    #[error("signing secret must be at least {min} bytes, got {actual}")]
    SecretTooShort { min: usize, actual: usize },

    /// Tokens must live for a non-zero duration.
    #[error("token lifetime must be greater than zero")]
    ZeroLifetime,

    /// A setting was present but could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
