//! Issuing and verifying signed identity tokens.
//!
//! A token is a compact JWT signed with HS256:
//!
//! ```text
//! base64url(header) . base64url({"sub": .., "iat": .., "exp": ..}) . base64url(hmac)
//! ```
//!
//! Nothing about a token is stored server-side. Whether it is valid is
//! recomputed on every [`TokenCodec::verify`] from the signature and the
//! embedded timestamps.
//!
//! # Check order
//!
//! ```text
//! structure ──→ signature ──→ expiry ──→ subject
//!  Malformed    BadSignature   Expired    MissingSubject
//! ```
//!
//! Claims are only looked at once the signature holds, so an attacker can't
//! learn anything from forging the payload of a token.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::clock::to_millis;
use crate::{Clock, SystemClock, TokenConfig, TokenError};

/// The one signing algorithm tokens are issued and accepted with.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// A verified identity: who the token vouches for, and until when.
///
/// Transient. It lives on the connection it was verified for and dies with
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The subject the token was issued for.
    pub subject: String,
    /// The instant the token stops being valid.
    pub expires_at: SystemTime,
}

/// Claims as they appear in the token payload.
///
/// `sub` is optional here so that a signed token without a subject is
/// reported as `MissingSubject` instead of `Malformed`.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<u64>,
    exp: u64,
}

/// Encodes identities into signed, expiring tokens and verifies them back.
///
/// Pure CPU work: a clock read plus one HMAC. Safe to share between any
/// number of tasks behind an `Arc`.
pub struct TokenCodec<K: Clock = SystemClock> {
    header: Header,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
    clock: K,
}

impl TokenCodec<SystemClock> {
    /// Creates a codec reading the system clock.
    pub fn new(config: &TokenConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K: Clock> TokenCodec<K> {
    /// Creates a codec that reads `now` from the given clock.
    pub fn with_clock(config: &TokenConfig, clock: K) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked against `clock`, not the library's own
        // reading of the system time.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            header: Header::new(ALGORITHM),
            encoding: EncodingKey::from_secret(config.secret()),
            decoding: DecodingKey::from_secret(config.secret()),
            validation,
            lifetime: config.lifetime(),
            clock,
        }
    }

    /// Issues a token for `subject`, valid from now for the configured
    /// lifetime.
    ///
    /// # Errors
    /// - [`TokenError::MissingSubject`] if `subject` is empty
    /// - [`TokenError::Encode`] if signing fails
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::MissingSubject);
        }

        let now = to_millis(self.clock.now());
        let expires = now.saturating_add(self.lifetime.as_millis() as u64);
        let claims = Claims {
            sub: Some(subject.to_owned()),
            iat: Some(now / 1000),
            // Rounded up so a sub-second remainder never lands in the past.
            exp: expires.div_ceil(1000),
        };

        let token = jsonwebtoken::encode(&self.header, &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))?;
        tracing::debug!(subject, exp = claims.exp, "issued token");
        Ok(token)
    }

    /// Verifies `token` and returns the identity it carries.
    ///
    /// # Errors
    /// - [`TokenError::Malformed`]: not a structurally valid token
    /// - [`TokenError::BadSignature`]: signed with another secret or algorithm
    /// - [`TokenError::Expired`]: `now >= exp`
    /// - [`TokenError::MissingSubject`]: `sub` absent or empty
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.decoding,
            &self.validation,
        )?;
        let claims = data.claims;

        let now = to_millis(self.clock.now());
        if now >= claims.exp.saturating_mul(1000) {
            return Err(TokenError::Expired);
        }

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingSubject)?;
        let expires_at = UNIX_EPOCH
            .checked_add(Duration::from_secs(claims.exp))
            .ok_or(TokenError::Malformed)?;

        Ok(Identity {
            subject,
            expires_at,
        })
    }

    /// How long issued tokens stay valid.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// The clock this codec reads.
    pub fn clock(&self) -> &K {
        &self.clock
    }
}
