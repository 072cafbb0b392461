//! Application hook for traffic on established connections.

use gatehouse_auth::Identity;
use gatehouse_transport::Frame;

/// Prefix [`EchoHandler`] puts in front of text replies.
pub const ECHO_PREFIX: &str = "Echo: ";

/// Handles inbound frames on an established connection.
///
/// Called once per frame, in arrival order, on the connection's own task.
/// A returned frame is written back to the same connection. To reach a
/// different user, keep a [`ServerHandle`](crate::ServerHandle) and call
/// `send_to`.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, sender: &Identity, frame: Frame) -> Option<Frame>;
}

/// Replies to every text frame with `"Echo: " + text` and sends binary
/// frames back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl MessageHandler for EchoHandler {
    fn on_message(&self, sender: &Identity, frame: Frame) -> Option<Frame> {
        tracing::debug!(subject = %sender.subject, len = frame.len(), "echo");
        Some(match frame {
            Frame::Text(text) => Frame::Text(format!("{ECHO_PREFIX}{text}")),
            Frame::Binary(data) => Frame::Binary(data),
        })
    }
}
