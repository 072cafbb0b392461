//! Connection lifecycle: ties one upgraded connection to the registry.
//!
//! ```text
//! Handshaking ──establish()──→ Established ──close()──→ Closed
//!      │                                                  ▲
//!      └──────────────────────close()─────────────────────┘
//! ```
//!
//! `Closed` is terminal. Only the `Established → Closed` edge touches the
//! registry, and it does so with [`SessionRegistry::release`], so closing a
//! connection that has already been superseded by a newer one for the same
//! identity leaves the newer entry alone.

use std::sync::Arc;

use gatehouse_auth::Identity;
use gatehouse_session::SessionRegistry;
use gatehouse_transport::Connection;

/// Where a connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Upgraded, not yet registered.
    Handshaking,
    /// Registered and exchanging messages.
    Established,
    /// Deregistered. Terminal.
    Closed,
}

/// Drives a single connection through [`LifecycleState`].
///
/// Dropping a lifecycle that is still `Established` closes it, so the
/// registry is cleaned up even if the owning task panics or returns early.
pub struct ConnectionLifecycle<C>
where
    C: Connection<Principal = Identity>,
{
    connection: Arc<C>,
    registry: Arc<SessionRegistry<C>>,
    state: LifecycleState,
}

impl<C> ConnectionLifecycle<C>
where
    C: Connection<Principal = Identity>,
{
    /// Starts tracking `connection` in the `Handshaking` state.
    pub fn new(connection: Arc<C>, registry: Arc<SessionRegistry<C>>) -> Self {
        Self {
            connection,
            registry,
            state: LifecycleState::Handshaking,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The subject this connection was admitted as.
    pub fn subject(&self) -> &str {
        &self.connection.principal().subject
    }

    /// The connection being tracked.
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Registers the connection under its subject.
    ///
    /// Returns the connection this one displaced, if any. Does nothing
    /// outside `Handshaking`.
    pub fn establish(&mut self) -> Option<Arc<C>> {
        if self.state != LifecycleState::Handshaking {
            tracing::debug!(
                conn_id = %self.connection.id(),
                state = ?self.state,
                "establish ignored"
            );
            return None;
        }
        self.state = LifecycleState::Established;
        let previous = self
            .registry
            .register(self.subject(), Arc::clone(&self.connection));
        if let Some(previous) = &previous {
            tracing::info!(
                subject = %self.subject(),
                conn_id = %self.connection.id(),
                displaced = %previous.id(),
                "identity reconnected, newer connection takes over"
            );
        }
        previous
    }

    /// Moves to `Closed`, releasing the registry entry if this connection
    /// still owns it.
    ///
    /// Returns `true` only when this call removed the entry. Calling it
    /// again is a no-op.
    pub fn close(&mut self) -> bool {
        let was =
            std::mem::replace(&mut self.state, LifecycleState::Closed);
        match was {
            LifecycleState::Established => self
                .registry
                .release(self.subject(), self.connection.id()),
            LifecycleState::Handshaking | LifecycleState::Closed => false,
        }
    }
}

impl<C> Drop for ConnectionLifecycle<C>
where
    C: Connection<Principal = Identity>,
{
    fn drop(&mut self) {
        if self.state == LifecycleState::Established {
            tracing::debug!(
                conn_id = %self.connection.id(),
                "lifecycle dropped while established, closing"
            );
            self.close();
        }
    }
}
