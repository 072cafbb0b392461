//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{
    Connection, ConnectionId, Frame, Transport, TransportError, Upgrade,
    UpgradeGate,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Upper bound on how long a peer may take to finish the upgrade.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections
/// and admits them through an [`UpgradeGate`].
pub struct WebSocketTransport<G: UpgradeGate> {
    listener: TcpListener,
    gate: Arc<G>,
    handshake_timeout: Duration,
}

impl<G: UpgradeGate> WebSocketTransport<G> {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str, gate: G) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            gate: Arc::new(gate),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Overrides how long a peer has to complete the upgrade.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to. Useful after binding
    /// to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl<G: UpgradeGate> Transport for WebSocketTransport<G> {
    type Upgrade = PendingUpgrade<G>;
    type Connection = WebSocketConnection<G::Principal>;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Upgrade, Self::Error> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer_addr, "accepted TCP connection");

        Ok(PendingUpgrade {
            stream,
            peer_addr,
            gate: Arc::clone(&self.gate),
            timeout: self.handshake_timeout,
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A TCP peer that has not been upgraded (or admitted) yet.
pub struct PendingUpgrade<G: UpgradeGate> {
    stream: TcpStream,
    peer_addr: SocketAddr,
    gate: Arc<G>,
    timeout: Duration,
}

impl<G: UpgradeGate> PendingUpgrade<G> {
    /// The remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl<G: UpgradeGate> Upgrade for PendingUpgrade<G> {
    type Connection = WebSocketConnection<G::Principal>;
    type Error = TransportError;

    async fn upgrade(self) -> Result<Self::Connection, Self::Error> {
        let PendingUpgrade {
            stream,
            peer_addr,
            gate,
            timeout,
        } = self;

        // The gate runs inside the handshake callback, i.e. after the
        // request is parsed and before the 101 response goes out. A refusal
        // is written back as a bare status and the socket is dropped.
        let mut admitted: Option<G::Principal> = None;
        let callback = |request: &Request,
                        response: Response|
         -> Result<Response, ErrorResponse> {
            match gate.admit(request) {
                Ok(principal) => {
                    admitted = Some(principal);
                    Ok(response)
                }
                Err(status) => {
                    let mut rejection = ErrorResponse::new(None);
                    *rejection.status_mut() = status;
                    Err(rejection)
                }
            }
        };

        let handshake = tokio_tungstenite::accept_hdr_async(stream, callback);
        let ws = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(tungstenite::Error::Http(response))) => {
                let status = response.status();
                tracing::debug!(%peer_addr, %status, "upgrade rejected");
                return Err(TransportError::Rejected(status));
            }
            Ok(Err(e)) => {
                return Err(TransportError::HandshakeFailed(e.to_string()));
            }
            Err(_) => return Err(TransportError::HandshakeTimedOut),
        };

        let principal = admitted.ok_or_else(|| {
            TransportError::HandshakeFailed(
                "upgrade completed without admission".into(),
            )
        })?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %peer_addr, "accepted WebSocket connection");

        // Reads and writes get separate locks: a task parked in `recv`
        // must not hold up another task writing to this peer.
        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            peer_addr,
            principal,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single upgraded WebSocket connection carrying the principal its gate
/// resolved.
pub struct WebSocketConnection<P> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    principal: P,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl<P> WebSocketConnection<P> {
    /// The remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

impl<P: Send + Sync + 'static> Connection for WebSocketConnection<P> {
    type Principal = P;
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.write(Message::Binary(data.to_vec().into())).await
    }

    async fn send_text(&self, text: &str) -> Result<(), Self::Error> {
        self.write(Message::Text(text.to_owned().into())).await
    }

    async fn recv(&self) -> Result<Option<Frame>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Binary(data.into())));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn principal(&self) -> &P {
        &self.principal
    }
}
