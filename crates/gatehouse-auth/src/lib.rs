//! Identity tokens and the bearer handshake gate for Gatehouse.
//!
//! This crate answers one question for the rest of the stack: *who is this
//! peer?*
//!
//! 1. **Issuing**: the login service calls [`TokenCodec::issue`] once a
//!    password checks out and hands the token to the client.
//! 2. **Verifying**: on every upgrade request, [`HandshakeGate`] pulls the
//!    `Authorization: Bearer <token>` header and runs
//!    [`TokenCodec::verify`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)     ← turns a HandshakeError into a refused upgrade
//!     ↕
//! Auth (this crate)  ← TokenConfig, TokenCodec, HandshakeGate
//! ```
//!
//! Nothing here does I/O. Both halves are plain CPU work and can run inside
//! the upgrade callback.

mod clock;
mod config;
mod error;
mod gate;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_TOKEN_LIFETIME, LIFETIME_ENV, MIN_SECRET_LEN, SECRET_ENV,
    TokenConfig,
};
pub use error::{ConfigError, HandshakeError, TokenError};
pub use gate::{BEARER_PREFIX, HandshakeGate};
pub use token::{ALGORITHM, Identity, TokenCodec};
