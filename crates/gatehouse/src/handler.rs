//! Per-connection handler: upgrade, register, message loop, release.
//!
//! Each accepted peer gets its own Tokio task running this handler.
//! The flow is:
//!   1. Run the WebSocket upgrade (the gate verifies the bearer token)
//!   2. Establish the lifecycle → identity registered
//!   3. Loop: receive frames → hand to the MessageHandler → write replies
//!   4. Close the lifecycle → identity released
//!
//! Registration finishes before the first frame is read, so anyone who can
//! observe a reply can also look the sender up.

use std::sync::Arc;
use std::time::Duration;

use gatehouse_auth::Identity;
use gatehouse_session::SessionRegistry;
use gatehouse_transport::{Connection, PendingUpgrade, Upgrade};

use crate::GatehouseError;
use crate::gate::ServerGate;
use crate::lifecycle::ConnectionLifecycle;
use crate::message::MessageHandler;
use crate::server::ServerState;

/// Handles a single peer from TCP accept to close.
pub(crate) async fn handle_connection<H: MessageHandler>(
    pending: PendingUpgrade<ServerGate>,
    state: Arc<ServerState<H>>,
) -> Result<(), GatehouseError> {
    let peer_addr = pending.peer_addr();

    // --- Step 1: Upgrade ---
    // A refused upgrade never produces a connection; nothing to clean up.
    let conn = Arc::new(pending.upgrade().await?);
    tracing::debug!(conn_id = %conn.id(), %peer_addr, "upgrade complete");

    run_session(
        conn,
        Arc::clone(&state.registry),
        &state.handler,
        state.idle_timeout,
    )
    .await;
    Ok(())
}

/// Steps 2 to 4 for an upgraded connection: register, pump frames through
/// `handler` until the peer leaves or goes idle, then release and close.
pub(crate) async fn run_session<C, H>(
    conn: Arc<C>,
    registry: Arc<SessionRegistry<C>>,
    handler: &H,
    idle_timeout: Option<Duration>,
) where
    C: Connection<Principal = Identity>,
    H: MessageHandler,
{
    let conn_id = conn.id();

    // --- Step 2: Register ---
    let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&conn), registry);
    lifecycle.establish();
    let subject = lifecycle.subject().to_owned();

    tracing::info!(%conn_id, %subject, "connection established");

    // --- Step 3: Message loop ---
    loop {
        let received = match idle_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, conn.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        tracing::info!(
                            %conn_id,
                            %subject,
                            "connection idle, closing"
                        );
                        break;
                    }
                }
            }
            None => conn.recv().await,
        };

        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(%conn_id, %subject, "peer closed connection");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, %subject, error = %e, "recv error");
                break;
            }
        };

        tracing::debug!(%conn_id, len = frame.len(), "frame received");

        if let Some(reply) = handler.on_message(conn.principal(), frame) {
            // A failed write is not a close; the read side decides that.
            if let Err(e) = conn.send_frame(&reply).await {
                tracing::warn!(
                    %conn_id,
                    %subject,
                    error = %e,
                    "reply not delivered"
                );
            }
        }
    }

    // --- Step 4: Release ---
    lifecycle.close();
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close handshake failed");
    }

    tracing::info!(%conn_id, %subject, "connection closed");
}
