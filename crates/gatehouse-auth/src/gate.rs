//! The bearer-token check run against every upgrade request.
//!
//! ```text
//! Authorization header?
//!   ├─ absent ─────────────────────────────→ MissingCredential
//!   ├─ not "Bearer <token>" ───────────────→ WrongScheme
//!   └─ TokenCodec::verify(token)
//!        ├─ Err(any TokenError) ───────────→ Unauthorized
//!        └─ Ok(identity) ──────────────────→ accept
//! ```
//!
//! Whatever the reason, the caller refuses the upgrade with 401. The
//! detailed reason only goes to the log.

use std::sync::Arc;

use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::{Clock, HandshakeError, Identity, SystemClock, TokenCodec};

/// Scheme prefix of the credential, including its single separating space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Extracts and verifies the bearer credential of an upgrade request.
pub struct HandshakeGate<K: Clock = SystemClock> {
    codec: Arc<TokenCodec<K>>,
}

impl<K: Clock> Clone for HandshakeGate<K> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<K: Clock> HandshakeGate<K> {
    /// Creates a gate verifying with the given codec.
    pub fn new(codec: Arc<TokenCodec<K>>) -> Self {
        Self { codec }
    }

    /// Checks the request headers and returns the verified subject.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<String, HandshakeError> {
        self.authenticate(headers).map(|identity| identity.subject)
    }

    /// Like [`authorize`](Self::authorize), but returns the full verified
    /// [`Identity`] so it can be attached to the connection.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<Identity, HandshakeError> {
        let token = match bearer_token(headers) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "handshake refused");
                return Err(e);
            }
        };

        match self.codec.verify(token) {
            Ok(identity) => {
                tracing::info!(subject = %identity.subject, "handshake token verified");
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!(reason = %e, "handshake refused: token rejected");
                Err(HandshakeError::Unauthorized(e))
            }
        }
    }

    /// The codec this gate verifies with.
    pub fn codec(&self) -> &TokenCodec<K> {
        &self.codec
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
///
/// The prefix match is case-sensitive with exactly one space; whatever
/// follows, even nothing, is the token.
fn bearer_token(headers: &HeaderMap) -> Result<&str, HandshakeError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(HandshakeError::MissingCredential)?;
    let value = value.to_str().map_err(|_| HandshakeError::WrongScheme)?;
    value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(HandshakeError::WrongScheme)
}
