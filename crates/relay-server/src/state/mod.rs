//! Owned relay state.
//!
//! All mutable server state lives in one [`RelayState`] value built at
//! startup and passed explicitly to whoever needs it; there are no ambient
//! globals. The whole bundle sits behind a single `RwLock` so each inbound
//! event is handled atomically from first check to last notification.

pub mod friends;
pub mod groups;
pub mod registry;

use std::sync::Arc;

use tokio::sync::RwLock;

use relay_core::events::GroupSummary;
use relay_logging::MessageLog;

pub use friends::FriendGraph;
pub use groups::GroupDirectory;
pub use registry::{Session, SessionRegistry};

/// The relay's entire mutable state plus the message-log handle.
pub struct RelayState {
    /// Live sessions and the username index.
    pub registry: SessionRegistry,
    /// Groups and memberships.
    pub groups: GroupDirectory,
    /// Friendships and pending requests.
    pub friends: FriendGraph,
    /// Message-log sink.
    pub log: MessageLog,
}

/// Shared handle handed to handlers and background tasks.
pub type SharedState = Arc<RwLock<RelayState>>;

impl RelayState {
    /// Fresh state writing to the given message log.
    #[must_use]
    pub fn new(log: MessageLog) -> Self {
        Self {
            registry: SessionRegistry::new(),
            groups: GroupDirectory::new(),
            friends: FriendGraph::new(),
            log,
        }
    }

    /// Fresh state wrapped for sharing.
    #[must_use]
    pub fn shared(log: MessageLog) -> SharedState {
        Arc::new(RwLock::new(Self::new(log)))
    }

    /// All groups with their live members, as reported to clients.
    ///
    /// Membership is filtered through transport liveness, so a member whose
    /// socket died but has not been swept yet is not shown.
    #[must_use]
    pub fn group_snapshot(&self) -> Vec<GroupSummary> {
        let mut summaries: Vec<GroupSummary> = self
            .groups
            .iter()
            .map(|(group_id, members)| {
                let mut usernames: Vec<_> = members
                    .iter()
                    .filter_map(|conn_id| self.registry.get(conn_id))
                    .filter(|s| s.connection.is_open())
                    .map(|s| s.username.clone())
                    .collect();
                usernames.sort();
                GroupSummary {
                    group_id: group_id.clone(),
                    member_count: usernames.len(),
                    members: usernames,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        summaries
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnection;
    use relay_core::ids::{ConnectionId, GroupId, Username};
    use tokio::sync::mpsc;

    fn make_conn(id: &str) -> Arc<ClientConnection> {
        let (tx, rx) = mpsc::channel(32);
        std::mem::forget(rx);
        Arc::new(ClientConnection::new(ConnectionId::from(id), tx))
    }

    #[test]
    fn snapshot_reports_live_members() {
        let mut state = RelayState::new(MessageLog::disabled());
        state
            .registry
            .register(&Username::from("alice"), make_conn("c1"))
            .unwrap();
        state
            .groups
            .create(&GroupId::from("g1"), &ConnectionId::from("c1"))
            .unwrap();

        let snapshot = state.group_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].group_id.as_str(), "g1");
        assert_eq!(snapshot[0].member_count, 1);
        assert_eq!(snapshot[0].members, vec![Username::from("alice")]);
    }

    #[test]
    fn snapshot_filters_dead_members() {
        let mut state = RelayState::new(MessageLog::disabled());
        let conn = make_conn("c1");
        state
            .registry
            .register(&Username::from("alice"), conn.clone())
            .unwrap();
        state
            .groups
            .create(&GroupId::from("g1"), &ConnectionId::from("c1"))
            .unwrap();
        conn.mark_closed();

        let snapshot = state.group_snapshot();
        assert_eq!(snapshot[0].member_count, 0);
        assert!(snapshot[0].members.is_empty());
    }

    #[test]
    fn empty_state_snapshot_is_empty() {
        let state = RelayState::new(MessageLog::disabled());
        assert!(state.group_snapshot().is_empty());
    }
}
