/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The [`UpgradeGate`](crate::UpgradeGate) refused the upgrade and the
    /// peer was answered with this status. No connection was created.
    #[error("upgrade rejected with status {0}")]
    Rejected(http::StatusCode),

    /// The upgrade handshake broke down at the protocol level
    /// (not a WebSocket request, peer hung up mid-handshake, ...).
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The upgrade did not finish within the allotted time.
    #[error("handshake timed out")]
    HandshakeTimedOut,
}
