//! `GatehouseServer` builder and server loop.
//!
//! This is the entry point for running a Gatehouse server. It ties
//! together all the layers: transport → gate → lifecycle → registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_auth::{HandshakeGate, Identity, TokenCodec};
use gatehouse_session::SessionRegistry;
use gatehouse_transport::{
    Connection, Frame, Transport, TransportError, WebSocketConnection,
    WebSocketTransport,
};

use crate::gate::ServerGate;
use crate::handler::handle_connection;
use crate::message::{EchoHandler, MessageHandler};
use crate::{GatehouseError, ServerConfig};

/// The connection type the server registers: a WebSocket carrying the
/// verified [`Identity`].
pub type WsConnection = WebSocketConnection<Identity>;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry does its own locking, so nothing here sits behind a mutex.
pub(crate) struct ServerState<H: MessageHandler> {
    pub(crate) registry: Arc<SessionRegistry<WsConnection>>,
    pub(crate) handler: H,
    pub(crate) idle_timeout: Option<Duration>,
}

/// Builder for configuring and starting a Gatehouse server.
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse::prelude::*;
///
/// let config = ServerConfig::from_env()?;
/// let server = GatehouseServer::builder(config)
///     .handler(EchoHandler)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct GatehouseServerBuilder<H: MessageHandler = EchoHandler> {
    config: ServerConfig,
    handler: H,
}

impl GatehouseServerBuilder<EchoHandler> {
    /// Creates a builder that echoes messages until a handler is set.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            handler: EchoHandler,
        }
    }
}

impl<H: MessageHandler> GatehouseServerBuilder<H> {
    /// Sets the handler for traffic on established connections.
    pub fn handler<H2: MessageHandler>(
        self,
        handler: H2,
    ) -> GatehouseServerBuilder<H2> {
        GatehouseServerBuilder {
            config: self.config,
            handler,
        }
    }

    /// Binds the listener. Connections are accepted once
    /// [`run`](GatehouseServer::run) is called.
    pub async fn build(self) -> Result<GatehouseServer<H>, GatehouseError> {
        let codec = Arc::new(TokenCodec::new(&self.config.token));
        let gate = ServerGate::new(
            self.config.endpoint.clone(),
            self.config.allowed_origins.clone(),
            HandshakeGate::new(Arc::clone(&codec)),
        );

        let transport =
            WebSocketTransport::bind(&self.config.bind_addr, gate)
                .await?
                .with_handshake_timeout(self.config.handshake_timeout);

        let state = Arc::new(ServerState {
            registry: Arc::new(SessionRegistry::new()),
            handler: self.handler,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(GatehouseServer {
            transport,
            state,
            codec,
            endpoint: self.config.endpoint,
        })
    }
}

/// A bound Gatehouse server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GatehouseServer<H: MessageHandler = EchoHandler> {
    transport: WebSocketTransport<ServerGate>,
    state: Arc<ServerState<H>>,
    codec: Arc<TokenCodec>,
    endpoint: String,
}

impl GatehouseServer<EchoHandler> {
    /// Creates a new builder.
    pub fn builder(config: ServerConfig) -> GatehouseServerBuilder {
        GatehouseServerBuilder::new(config)
    }
}

impl<H: MessageHandler> GatehouseServer<H> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The session registry every connection registers in.
    pub fn registry(&self) -> &Arc<SessionRegistry<WsConnection>> {
        &self.state.registry
    }

    /// The codec the gate verifies with. Tokens it issues are accepted by
    /// this server.
    pub fn token_codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// A cloneable handle for addressing connected users from elsewhere.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            registry: Arc::clone(&self.state.registry),
        }
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), GatehouseError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// Each accepted peer is upgraded on its own task, so a client that
    /// stalls mid-handshake never holds up the next accept. On shutdown
    /// every live connection is sent a close frame.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), GatehouseError> {
        tokio::pin!(shutdown);

        let addr = self.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(
            %addr,
            endpoint = %self.endpoint,
            "Gatehouse server running"
        );

        let mut accept_failures: u32 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        accept_failures = 0;
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(pending, state).await
                            {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        accept_failures = accept_failures.saturating_add(1);
                        let delay = accept_backoff(accept_failures);
                        tracing::error!(
                            error = %e,
                            retry_in = ?delay,
                            "accept failed"
                        );
                        // Out of file descriptors and the like fail again
                        // immediately; pause instead of spinning.
                        tokio::select! {
                            _ = &mut shutdown => {
                                tracing::info!("shutdown requested");
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }

        self.transport.shutdown().await?;
        self.close_all().await;
        Ok(())
    }

    async fn close_all(&self) {
        let registry = &self.state.registry;
        for identity in registry.identities() {
            if let Some(conn) = registry.lookup(&identity) {
                if let Err(e) = conn.close().await {
                    tracing::debug!(
                        %identity,
                        error = %e,
                        "close on shutdown failed"
                    );
                }
            }
        }
    }
}

/// Pause after the `failures`-th accept error in a row: 100 ms, doubling,
/// capped at one second.
fn accept_backoff(failures: u32) -> Duration {
    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_secs(1);

    let exponent = failures.saturating_sub(1).min(4);
    (BASE * 2u32.pow(exponent)).min(MAX)
}

/// Cloneable access to the live sessions of a running server.
#[derive(Clone)]
pub struct ServerHandle {
    registry: Arc<SessionRegistry<WsConnection>>,
}

impl ServerHandle {
    /// The registry shared with the running server.
    pub fn registry(&self) -> &Arc<SessionRegistry<WsConnection>> {
        &self.registry
    }

    /// Returns `true` if `identity` currently has a live connection.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.registry.contains(identity)
    }

    /// Writes `frame` to the live connection of `identity`.
    ///
    /// Fails with [`GatehouseError::NotConnected`] if nobody is registered
    /// under that identity.
    pub async fn send_to(
        &self,
        identity: &str,
        frame: &Frame,
    ) -> Result<(), GatehouseError> {
        let conn = self
            .registry
            .lookup(identity)
            .ok_or_else(|| GatehouseError::NotConnected(identity.to_owned()))?;
        conn.send_frame(frame).await?;
        tracing::debug!(identity, conn_id = %conn.id(), "frame delivered");
        Ok(())
    }
}
