//! Session tracking for Gatehouse.
//!
//! Keeps exactly one live connection per authenticated identity so the rest
//! of the platform can address a message to a user by name.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)              ← registers on connect, releases on close
//!     ↕
//! Session Layer (this crate)  ← SessionRegistry: identity → connection
//!     ↕
//! Transport Layer (below)     ← provides Connection, ConnectionId
//! ```

mod registry;

pub use registry::SessionRegistry;
