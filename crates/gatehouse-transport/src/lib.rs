//! Transport abstraction layer for Gatehouse.
//!
//! Provides the [`Transport`], [`Upgrade`] and [`Connection`] traits that
//! abstract over the network protocol, plus the [`UpgradeGate`] hook that
//! decides, from the raw upgrade request, whether a connection may exist at
//! all.
//!
//! Accepting is split in two steps so a slow client can never stall the
//! accept loop:
//!
//! ```text
//! Transport::accept() ──→ Upgrade (raw socket, not yet a connection)
//!                              │
//!                              ▼  UpgradeGate::admit(request)
//!                 Ok(principal) │ Err(status) → peer gets `status`, no connection
//!                              ▼
//!                          Connection (principal attached)
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingUpgrade, WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection.
///
/// Unique for the lifetime of the process, so two connections opened by the
/// same user can always be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single application message travelling over a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Binary(Vec<u8>),
}

impl Frame {
    /// Returns the payload as bytes, regardless of the frame kind.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides whether an inbound upgrade request may become a connection.
///
/// Called exactly once per request, before the upgrade response is written.
/// On `Ok` the returned principal is stored on the connection; on `Err` the
/// peer receives the returned status with an empty body and no connection
/// object is ever created.
///
/// `admit` is synchronous on purpose: it runs inside the handshake callback
/// and must only do CPU work (header parsing, signature checks).
pub trait UpgradeGate: Send + Sync + 'static {
    /// What the gate learned about the peer (for example, a verified identity).
    type Principal: Send + Sync + 'static;

    /// Inspects the request line and headers of the upgrade request.
    fn admit(
        &self,
        request: &http::Request<()>,
    ) -> Result<Self::Principal, http::StatusCode>;
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The pending upgrade produced by [`accept`](Self::accept).
    type Upgrade: Upgrade<Connection = Self::Connection>;
    /// The connection type produced once an upgrade succeeds.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming peer. Does not perform the upgrade.
    async fn accept(&mut self) -> Result<Self::Upgrade, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A raw, not yet admitted peer.
pub trait Upgrade: Send + 'static {
    /// The connection type produced on success.
    type Connection: Connection;
    /// The error type for the upgrade.
    type Error: std::error::Error + Send + Sync;

    /// Runs the upgrade handshake, consulting the transport's gate.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// The principal attached by the gate during the upgrade.
    type Principal: Send + Sync + 'static;
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends binary data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Sends a text message to the remote peer.
    async fn send_text(&self, text: &str) -> Result<(), Self::Error>;

    /// Sends a [`Frame`], dispatching on its kind.
    async fn send_frame(&self, frame: &Frame) -> Result<(), Self::Error> {
        match frame {
            Frame::Text(text) => self.send_text(text).await,
            Frame::Binary(data) => self.send(data).await,
        }
    }

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Frame>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the principal the gate attached to this connection.
    fn principal(&self) -> &Self::Principal;
}
