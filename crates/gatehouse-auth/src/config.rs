//! Token configuration: the shared signing secret and the token lifetime.
//!
//! Loaded once at startup and never mutated. The issuing side (the login
//! service) and the verifying side (the handshake gate) must be built from
//! the same secret, or every verification fails with `BadSignature`.

use std::fmt;
use std::time::Duration;

use crate::ConfigError;

/// Shortest signing secret accepted, in bytes (256 bits for HS256).
pub const MIN_SECRET_LEN: usize = 32;

/// Token lifetime used when none is configured.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Environment variable holding the signing secret.
pub const SECRET_ENV: &str = "GATEHOUSE_TOKEN_SECRET";

/// Environment variable holding the token lifetime in milliseconds.
pub const LIFETIME_ENV: &str = "GATEHOUSE_TOKEN_LIFETIME_MS";

/// Validated token settings.
///
/// The fields are private so a `TokenConfig` can only exist in a valid
/// state: secret at least [`MIN_SECRET_LEN`] bytes, lifetime non-zero.
#[derive(Clone)]
pub struct TokenConfig {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl TokenConfig {
    /// Builds a config, enforcing the secret length and a non-zero lifetime.
    pub fn new(
        secret: impl Into<Vec<u8>>,
        lifetime: Duration,
    ) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }
        if lifetime.is_zero() {
            return Err(ConfigError::ZeroLifetime);
        }
        Ok(Self { secret, lifetime })
    }

    /// Reads [`SECRET_ENV`] and [`LIFETIME_ENV`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with a caller-supplied
    /// lookup, so tests do not have to touch the real environment.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let secret = lookup(SECRET_ENV).ok_or(ConfigError::Missing(SECRET_ENV))?;
        let lifetime = match lookup(LIFETIME_ENV) {
            Some(raw) => {
                let millis: u64 =
                    raw.trim().parse().map_err(|e| ConfigError::Invalid {
                        key: LIFETIME_ENV,
                        reason: format!("{e}"),
                    })?;
                Duration::from_millis(millis)
            }
            None => DEFAULT_TOKEN_LIFETIME,
        };
        Self::new(secret, lifetime)
    }

    /// The raw signing secret.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// How long an issued token stays valid.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

// The secret must never end up in a log line.
impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
