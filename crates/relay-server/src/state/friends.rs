//! Friend graph: mutual friendships and pending requests.

use std::collections::{HashMap, HashSet};

use relay_core::RelayError;
use relay_core::events::FriendRequestSets;
use relay_core::ids::Username;

/// One user's view of the graph.
#[derive(Debug, Default)]
struct FriendRecord {
    friends: HashSet<Username>,
    sent: HashSet<Username>,
    received: HashSet<Username>,
}

/// Friendship state keyed by exact username.
///
/// Records are created lazily the first time a name is referenced and
/// survive disconnects. For any pair, the friends sets and the pending sets
/// are mutually exclusive, and a `sent` entry on one side always has the
/// matching `received` entry on the other; every mutation updates both
/// records before returning.
#[derive(Default)]
pub struct FriendGraph {
    records: HashMap<Username, FriendRecord>,
}

impl FriendGraph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a record exists for a user. Called at registration.
    pub fn ensure_record(&mut self, user: &Username) {
        let _ = self.records.entry(user.clone()).or_default();
    }

    /// File a friend request from `from` to `to`.
    pub fn send_request(&mut self, from: &Username, to: &Username) -> Result<(), RelayError> {
        if from == to {
            return Err(RelayError::SelfFriendRequest);
        }
        self.ensure_record(from);
        self.ensure_record(to);

        let sender = &self.records[from];
        if sender.friends.contains(to) {
            return Err(RelayError::AlreadyFriends(to.clone()));
        }
        if sender.sent.contains(to) {
            return Err(RelayError::RequestAlreadySent);
        }

        let _ = self
            .records
            .get_mut(from)
            .map(|r| r.sent.insert(to.clone()));
        let _ = self
            .records
            .get_mut(to)
            .map(|r| r.received.insert(from.clone()));
        Ok(())
    }

    /// Accept the pending request `requester` sent to `accepter`.
    ///
    /// Returns both parties' updated friends lists `(accepter's, requester's)`.
    pub fn accept(
        &mut self,
        accepter: &Username,
        requester: &Username,
    ) -> Result<(Vec<Username>, Vec<Username>), RelayError> {
        let has_request = self
            .records
            .get(accepter)
            .is_some_and(|r| r.received.contains(requester));
        if !has_request {
            return Err(RelayError::RequestNotFound);
        }

        // A received entry implies the requester record exists.
        if let Some(r) = self.records.get_mut(accepter) {
            let _ = r.received.remove(requester);
            let _ = r.friends.insert(requester.clone());
        }
        if let Some(r) = self.records.get_mut(requester) {
            let _ = r.sent.remove(accepter);
            let _ = r.friends.insert(accepter.clone());
        }

        Ok((self.friends_of(accepter), self.friends_of(requester)))
    }

    /// Decline the pending request `requester` sent to `decliner`.
    ///
    /// Clearing an already-absent request is still a success; the decliner
    /// gets their (possibly unchanged) pending sets back. Returns `None`
    /// only when neither side has ever been seen.
    pub fn decline(
        &mut self,
        decliner: &Username,
        requester: &Username,
    ) -> Option<FriendRequestSets> {
        if !self.records.contains_key(decliner) || !self.records.contains_key(requester) {
            return None;
        }
        if let Some(r) = self.records.get_mut(decliner) {
            let _ = r.received.remove(requester);
        }
        if let Some(r) = self.records.get_mut(requester) {
            let _ = r.sent.remove(decliner);
        }
        Some(self.request_sets(decliner))
    }

    /// Whether two users are friends.
    #[must_use]
    pub fn are_friends(&self, a: &Username, b: &Username) -> bool {
        self.records
            .get(a)
            .is_some_and(|r| r.friends.contains(b))
    }

    /// A user's friends, sorted. Empty for never-seen users.
    #[must_use]
    pub fn friends_of(&self, user: &Username) -> Vec<Username> {
        let mut friends: Vec<Username> = self
            .records
            .get(user)
            .map(|r| r.friends.iter().cloned().collect())
            .unwrap_or_default();
        friends.sort();
        friends
    }

    /// A user's pending requests, both directions, sorted.
    #[must_use]
    pub fn request_sets(&self, user: &Username) -> FriendRequestSets {
        let Some(record) = self.records.get(user) else {
            return FriendRequestSets::default();
        };
        let mut sent: Vec<Username> = record.sent.iter().cloned().collect();
        let mut received: Vec<Username> = record.received.iter().cloned().collect();
        sent.sort();
        received.sort();
        FriendRequestSets { sent, received }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
