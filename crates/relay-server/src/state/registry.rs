//! Session registry: live connections and the username index.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use relay_core::RelayError;
use relay_core::ids::{ConnectionId, GroupId, Username, UsernameKey};

use crate::connection::ClientConnection;

/// One registered client: the connection plus its relay-level identity.
pub struct Session {
    /// Transport handle.
    pub connection: Arc<ClientConnection>,
    /// Registered display name, original casing preserved.
    pub username: Username,
    /// Groups this session currently belongs to.
    pub joined_groups: HashSet<GroupId>,
}

/// Registry of registered sessions.
///
/// The primary map is keyed by connection ID. A secondary index maps the
/// canonical username key to the owning connection so uniqueness checks and
/// recipient resolution never scan. The two maps mutate together; the index
/// only ever points at a session that exists in the primary map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    by_name: HashMap<UsernameKey, ConnectionId>,
    known_users: BTreeSet<Username>,
}

impl SessionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a display name.
    ///
    /// The name is stored trimmed but with its original casing; uniqueness
    /// is checked case-insensitively against live sessions only. A dead
    /// session still awaiting sweep does not block the name.
    pub fn register(
        &mut self,
        username: &Username,
        connection: Arc<ClientConnection>,
    ) -> Result<Username, RelayError> {
        let trimmed = Username::from(username.as_str().trim());
        let key = trimmed.key();

        if let Some(holder) = self.by_name.get(&key) {
            let live = self
                .sessions
                .get(holder)
                .is_some_and(|s| s.connection.is_open());
            if live {
                return Err(RelayError::UsernameTaken);
            }
        }

        connection.mark_heartbeat();
        let conn_id = connection.id.clone();
        let _ = self.sessions.insert(
            conn_id.clone(),
            Session {
                connection,
                username: trimmed.clone(),
                joined_groups: HashSet::new(),
            },
        );
        let _ = self.by_name.insert(key, conn_id);
        let _ = self.known_users.insert(trimmed.clone());
        Ok(trimmed)
    }

    /// Remove a session, fixing the username index.
    ///
    /// The index entry is only removed if it still points at this
    /// connection; a name re-registered by a newer session keeps its entry.
    pub fn remove(&mut self, conn_id: &ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(conn_id)?;
        let key = session.username.key();
        if self.by_name.get(&key) == Some(conn_id) {
            let _ = self.by_name.remove(&key);
        }
        Some(session)
    }

    /// Record a heartbeat for a connection. No-op for unknown connections.
    ///
    /// Returns whether the connection was registered.
    pub fn heartbeat(&self, conn_id: &ConnectionId) -> bool {
        match self.sessions.get(conn_id) {
            Some(session) => {
                session.connection.mark_heartbeat();
                true
            }
            None => false,
        }
    }

    /// Session for a connection.
    #[must_use]
    pub fn get(&self, conn_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(conn_id)
    }

    /// Mutable session for a connection.
    pub fn get_mut(&mut self, conn_id: &ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(conn_id)
    }

    /// Resolve a username to its live session, via the index.
    ///
    /// Returns `None` when the name is unknown or its transport has closed;
    /// liveness is re-checked on every call.
    #[must_use]
    pub fn resolve(&self, username: &Username) -> Option<&Session> {
        let conn_id = self.by_name.get(&username.key())?;
        let session = self.sessions.get(conn_id)?;
        session.connection.is_open().then_some(session)
    }

    /// Usernames of currently live sessions, sorted.
    #[must_use]
    pub fn online_users(&self) -> Vec<Username> {
        let mut users: Vec<Username> = self
            .sessions
            .values()
            .filter(|s| s.connection.is_open())
            .map(|s| s.username.clone())
            .collect();
        users.sort();
        users
    }

    /// Every username ever registered, online or not, sorted.
    #[must_use]
    pub fn known_users(&self) -> Vec<Username> {
        self.known_users.iter().cloned().collect()
    }

    /// Iterate all sessions.
    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &Session)> {
        self.sessions.iter()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_conn(id: &str) -> Arc<ClientConnection> {
        let (tx, rx) = mpsc::channel(32);
        // Receiver leaks so sends keep succeeding for the test's lifetime.
        std::mem::forget(rx);
        Arc::new(ClientConnection::new(ConnectionId::from(id), tx))
    }

    #[test]
    fn register_and_resolve() {
        let mut reg = SessionRegistry::new();
        let conn = make_conn("c1");
        reg.register(&Username::from("Alice"), conn).unwrap();
        let session = reg.resolve(&Username::from("alice")).unwrap();
        assert_eq!(session.username.as_str(), "Alice");
    }

    #[test]
    fn register_trims_whitespace() {
        let mut reg = SessionRegistry::new();
        let stored = reg.register(&Username::from("  Alice "), make_conn("c1")).unwrap();
        assert_eq!(stored.as_str(), "Alice");
        assert!(reg.resolve(&Username::from("alice")).is_some());
    }

    #[test]
    fn duplicate_live_username_rejected_case_insensitively() {
        let mut reg = SessionRegistry::new();
        reg.register(&Username::from("Alice"), make_conn("c1")).unwrap();
        let err = reg
            .register(&Username::from("ALICE"), make_conn("c2"))
            .unwrap_err();
        assert_eq!(err, RelayError::UsernameTaken);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn dead_session_does_not_block_the_name() {
        let mut reg = SessionRegistry::new();
        let stale = make_conn("c1");
        reg.register(&Username::from("Alice"), stale.clone()).unwrap();
        stale.mark_closed();

        reg.register(&Username::from("alice"), make_conn("c2")).unwrap();
        let session = reg.resolve(&Username::from("Alice")).unwrap();
        assert_eq!(session.connection.id.as_str(), "c2");
    }

    #[test]
    fn removing_stale_session_keeps_newer_index_entry() {
        let mut reg = SessionRegistry::new();
        let stale = make_conn("c1");
        reg.register(&Username::from("Alice"), stale.clone()).unwrap();
        stale.mark_closed();
        reg.register(&Username::from("Alice"), make_conn("c2")).unwrap();

        // Sweeping the dead session must not drop the live session's index.
        let removed = reg.remove(&ConnectionId::from("c1")).unwrap();
        assert_eq!(removed.username.as_str(), "Alice");
        assert!(reg.resolve(&Username::from("alice")).is_some());
    }

    #[test]
    fn remove_clears_index() {
        let mut reg = SessionRegistry::new();
        reg.register(&Username::from("Alice"), make_conn("c1")).unwrap();
        assert!(reg.remove(&ConnectionId::from("c1")).is_some());
        assert!(reg.resolve(&Username::from("Alice")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn resolve_ignores_closed_transport() {
        let mut reg = SessionRegistry::new();
        let conn = make_conn("c1");
        reg.register(&Username::from("Alice"), conn.clone()).unwrap();
        conn.mark_closed();
        assert!(reg.resolve(&Username::from("Alice")).is_none());
    }

    #[test]
    fn heartbeat_only_for_registered() {
        let mut reg = SessionRegistry::new();
        reg.register(&Username::from("Alice"), make_conn("c1")).unwrap();
        assert!(reg.heartbeat(&ConnectionId::from("c1")));
        assert!(!reg.heartbeat(&ConnectionId::from("unknown")));
    }

    #[test]
    fn online_users_excludes_closed() {
        let mut reg = SessionRegistry::new();
        reg.register(&Username::from("Bob"), make_conn("c1")).unwrap();
        let gone = make_conn("c2");
        reg.register(&Username::from("Alice"), gone.clone()).unwrap();
        gone.mark_closed();

        assert_eq!(reg.online_users(), vec![Username::from("Bob")]);
    }

    #[test]
    fn known_users_survive_removal() {
        let mut reg = SessionRegistry::new();
        reg.register(&Username::from("Alice"), make_conn("c1")).unwrap();
        let _ = reg.remove(&ConnectionId::from("c1"));
        assert_eq!(reg.known_users(), vec![Username::from("Alice")]);
        assert!(reg.online_users().is_empty());
    }
}
