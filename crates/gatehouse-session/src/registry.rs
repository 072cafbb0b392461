//! The session registry: who is connected, and on which connection.
//!
//! # Concurrency note
//!
//! Unlike a plain `HashMap` behind one big mutex, the registry is built on
//! [`DashMap`], a sharded concurrent map. Every operation locks a single
//! shard for the duration of one call, so:
//!
//! - `register`, `remove`, `release` and `lookup` are each atomic: a reader
//!   never sees half an entry;
//! - operations on different identities almost never contend;
//! - no guard ever escapes a method, so nothing here can be held across an
//!   `.await`.
//!
//! # One identity, one connection
//!
//! `register` overwrites. If a user opens a second connection, the registry
//! points at the newest one. The older connection closing later must not
//! evict the newer one, which is why connection teardown goes through
//! [`SessionRegistry::release`] (compare-and-remove on the connection id)
//! rather than [`SessionRegistry::remove`] (remove by identity alone).

use std::sync::Arc;

use dashmap::DashMap;
use gatehouse_transport::{Connection, ConnectionId};

/// Concurrent mapping from identity to its live connection.
///
/// Owned explicitly (typically behind an `Arc`) and handed to whoever needs
/// it; there is no process-global instance.
pub struct SessionRegistry<C: Connection> {
    /// Live sessions keyed by subject. At most one entry per identity.
    sessions: DashMap<String, Arc<C>>,
}

impl<C: Connection> SessionRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Registers `connection` as the live connection of `identity`.
    ///
    /// Always succeeds. If the identity already had a connection, it is
    /// replaced and returned so the caller can log or close it.
    pub fn register(
        &self,
        identity: &str,
        connection: Arc<C>,
    ) -> Option<Arc<C>> {
        let conn_id = connection.id();
        let previous = self.sessions.insert(identity.to_owned(), connection);
        match &previous {
            Some(old) => tracing::info!(
                identity,
                %conn_id,
                replaced = %old.id(),
                "session registered, replacing previous connection"
            ),
            None => tracing::info!(identity, %conn_id, "session registered"),
        }
        previous
    }

    /// Removes whatever connection is registered for `identity`.
    ///
    /// A no-op when nothing is registered.
    pub fn remove(&self, identity: &str) -> Option<Arc<C>> {
        let removed = self.sessions.remove(identity).map(|(_, conn)| conn);
        if let Some(conn) = &removed {
            tracing::info!(identity, conn_id = %conn.id(), "session removed");
        }
        removed
    }

    /// Removes the entry for `identity` only if it still belongs to
    /// `connection`.
    ///
    /// Returns `true` if an entry was removed. Returns `false` if the
    /// identity is absent or has since been taken over by another
    /// connection, which is left untouched.
    pub fn release(&self, identity: &str, connection: ConnectionId) -> bool {
        let released = self
            .sessions
            .remove_if(identity, |_, conn| conn.id() == connection)
            .is_some();
        if released {
            tracing::info!(identity, conn_id = %connection, "session released");
        } else {
            tracing::debug!(
                identity,
                conn_id = %connection,
                "nothing to release (absent or superseded)"
            );
        }
        released
    }

    /// Returns the live connection of `identity`, if any.
    pub fn lookup(&self, identity: &str) -> Option<Arc<C>> {
        self.sessions
            .get(identity)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if `identity` has a registered connection.
    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Snapshot of all registered identities, in no particular order.
    pub fn identities(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<C: Connection> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionRegistry`.
    //!
    //! Naming follows `test_{function}_{scenario}_{expected}`. Connections
    //! are stand-ins that only carry an id; the registry never does I/O on
    //! them.

    use gatehouse_transport::Frame;

    use super::*;

    struct FakeConnection {
        id: ConnectionId,
    }

    impl Connection for FakeConnection {
        type Principal = ();
        type Error = std::io::Error;

        async fn send(&self, _data: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn send_text(&self, _text: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Frame>, Self::Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }

        fn principal(&self) -> &() {
            &()
        }
    }

    fn conn(id: u64) -> Arc<FakeConnection> {
        Arc::new(FakeConnection {
            id: ConnectionId::new(id),
        })
    }

    fn registry() -> SessionRegistry<FakeConnection> {
        SessionRegistry::new()
    }

    // =====================================================================
    // register() / lookup()
    // =====================================================================

    #[test]
    fn test_register_then_lookup_returns_same_handle() {
        let reg = registry();
        let h = conn(1);

        assert!(reg.register("u", Arc::clone(&h)).is_none());

        let found = reg.lookup("u").expect("should be registered");
        assert!(Arc::ptr_eq(&found, &h));
    }

    #[test]
    fn test_lookup_unknown_identity_returns_none() {
        assert!(registry().lookup("nobody").is_none());
    }

    #[test]
    fn test_register_same_identity_overwrites_and_returns_previous() {
        let reg = registry();
        reg.register("u", conn(1));

        let previous = reg.register("u", conn(2)).expect("should displace");

        assert_eq!(previous.id(), ConnectionId::new(1));
        assert_eq!(reg.lookup("u").unwrap().id(), ConnectionId::new(2));
        assert_eq!(reg.len(), 1, "still one entry per identity");
    }

    #[test]
    fn test_lookup_does_not_mutate() {
        let reg = registry();
        reg.register("u", conn(1));

        let _ = reg.lookup("u");
        let _ = reg.lookup("v");

        assert_eq!(reg.identities(), vec!["u".to_string()]);
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[test]
    fn test_remove_registered_identity_clears_entry() {
        let reg = registry();
        reg.register("u", conn(1));

        let removed = reg.remove("u");

        assert_eq!(removed.map(|c| c.id()), Some(ConnectionId::new(1)));
        assert!(reg.lookup("u").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_absent_identity_is_noop() {
        let reg = registry();
        reg.register("other", conn(1));

        assert!(reg.remove("u").is_none());
        assert!(reg.remove("u").is_none());
        assert!(reg.contains("other"));
    }

    // =====================================================================
    // release()
    // =====================================================================

    #[test]
    fn test_release_own_connection_removes_entry() {
        let reg = registry();
        reg.register("u", conn(1));

        assert!(reg.release("u", ConnectionId::new(1)));
        assert!(!reg.contains("u"));
    }

    #[test]
    fn test_release_superseded_connection_keeps_newer_entry() {
        // Connection 1 registers, connection 2 takes over, then connection
        // 1's close arrives late. Connection 2 must stay reachable.
        let reg = registry();
        reg.register("u", conn(1));
        reg.register("u", conn(2));

        assert!(!reg.release("u", ConnectionId::new(1)));

        assert_eq!(reg.lookup("u").unwrap().id(), ConnectionId::new(2));
    }

    #[test]
    fn test_release_twice_removes_once() {
        let reg = registry();
        reg.register("u", conn(1));

        assert!(reg.release("u", ConnectionId::new(1)));
        assert!(!reg.release("u", ConnectionId::new(1)));
    }

    #[test]
    fn test_release_leaves_other_identities_alone() {
        let reg = registry();
        reg.register("a", conn(1));
        reg.register("b", conn(2));

        reg.release("a", ConnectionId::new(1));

        assert!(!reg.contains("a"));
        assert_eq!(reg.lookup("b").unwrap().id(), ConnectionId::new(2));
    }

    // =====================================================================
    // len() / is_empty() / identities()
    // =====================================================================

    #[test]
    fn test_len_tracks_session_count() {
        let reg = registry();
        assert_eq!(reg.len(), 0);
        assert!(reg.is_empty());

        reg.register("a", conn(1));
        reg.register("b", conn(2));
        assert_eq!(reg.len(), 2);

        let mut ids = reg.identities();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
