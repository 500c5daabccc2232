//! Group directory: named groups and their memberships.

use std::collections::{HashMap, HashSet};

use relay_core::RelayError;
use relay_core::ids::{ConnectionId, GroupId};

/// Named groups mapped to their member connections.
///
/// A group owes its existence to its members: the emptying operation always
/// deletes it in the same call, so a zero-member group is never observable.
#[derive(Default)]
pub struct GroupDirectory {
    groups: HashMap<GroupId, HashSet<ConnectionId>>,
}

impl GroupDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group with the creator as sole initial member.
    pub fn create(&mut self, group_id: &GroupId, creator: &ConnectionId) -> Result<(), RelayError> {
        if self.groups.contains_key(group_id) {
            return Err(RelayError::GroupExists(group_id.clone()));
        }
        let _ = self
            .groups
            .insert(group_id.clone(), HashSet::from([creator.clone()]));
        Ok(())
    }

    /// Add a member to an existing group.
    pub fn join(&mut self, group_id: &GroupId, member: &ConnectionId) -> Result<(), RelayError> {
        let members = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RelayError::GroupNotFound(group_id.clone()))?;
        if !members.insert(member.clone()) {
            return Err(RelayError::AlreadyMember(group_id.clone()));
        }
        Ok(())
    }

    /// Remove a member, deleting the group if it empties.
    ///
    /// Returns `true` when the group was deleted.
    pub fn leave(&mut self, group_id: &GroupId, member: &ConnectionId) -> Result<bool, RelayError> {
        let members = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RelayError::NotAMember(group_id.clone()))?;
        if !members.remove(member) {
            return Err(RelayError::NotAMember(group_id.clone()));
        }
        if members.is_empty() {
            let _ = self.groups.remove(group_id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove a member during disconnect cascade. Unknown memberships are a
    /// no-op. Returns `true` when the group was deleted.
    pub fn remove_member(&mut self, group_id: &GroupId, member: &ConnectionId) -> bool {
        let Some(members) = self.groups.get_mut(group_id) else {
            return false;
        };
        let _ = members.remove(member);
        if members.is_empty() {
            let _ = self.groups.remove(group_id);
            return true;
        }
        false
    }

    /// Whether a group exists.
    #[must_use]
    pub fn contains(&self, group_id: &GroupId) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Members of a group.
    #[must_use]
    pub fn members(&self, group_id: &GroupId) -> Option<&HashSet<ConnectionId>> {
        self.groups.get(group_id)
    }

    /// Iterate all groups.
    pub fn iter(&self) -> impl Iterator<Item = (&GroupId, &HashSet<ConnectionId>)> {
        self.groups.iter()
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(s: &str) -> GroupId {
        GroupId::from(s)
    }

    fn cid(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    #[test]
    fn create_makes_creator_sole_member() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        let members = dir.members(&gid("g1")).unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains(&cid("c1")));
    }

    #[test]
    fn create_duplicate_fails() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        assert_eq!(
            dir.create(&gid("g1"), &cid("c2")),
            Err(RelayError::GroupExists(gid("g1")))
        );
    }

    #[test]
    fn join_missing_group_fails() {
        let mut dir = GroupDirectory::new();
        assert_eq!(
            dir.join(&gid("nope"), &cid("c1")),
            Err(RelayError::GroupNotFound(gid("nope")))
        );
    }

    #[test]
    fn join_twice_fails() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        dir.join(&gid("g1"), &cid("c2")).unwrap();
        assert_eq!(
            dir.join(&gid("g1"), &cid("c2")),
            Err(RelayError::AlreadyMember(gid("g1")))
        );
    }

    #[test]
    fn leave_non_member_fails() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        assert_eq!(
            dir.leave(&gid("g1"), &cid("c2")),
            Err(RelayError::NotAMember(gid("g1")))
        );
        assert_eq!(
            dir.leave(&gid("missing"), &cid("c1")),
            Err(RelayError::NotAMember(gid("missing")))
        );
    }

    #[test]
    fn last_leave_deletes_group() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        let deleted = dir.leave(&gid("g1"), &cid("c1")).unwrap();
        assert!(deleted);
        assert!(!dir.contains(&gid("g1")));
    }

    #[test]
    fn non_last_leave_keeps_group() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        dir.join(&gid("g1"), &cid("c2")).unwrap();
        let deleted = dir.leave(&gid("g1"), &cid("c1")).unwrap();
        assert!(!deleted);
        assert_eq!(dir.members(&gid("g1")).unwrap().len(), 1);
    }

    #[test]
    fn remove_member_deletes_when_emptied() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        assert!(dir.remove_member(&gid("g1"), &cid("c1")));
        assert!(dir.is_empty());
    }

    #[test]
    fn remove_member_unknown_is_noop() {
        let mut dir = GroupDirectory::new();
        assert!(!dir.remove_member(&gid("g1"), &cid("c1")));
    }

    #[test]
    fn join_leave_parity_restores_prior_membership() {
        let mut dir = GroupDirectory::new();
        dir.create(&gid("g1"), &cid("c1")).unwrap();
        let before: HashSet<ConnectionId> = dir.members(&gid("g1")).unwrap().clone();

        dir.join(&gid("g1"), &cid("c2")).unwrap();
        let _ = dir.leave(&gid("g1"), &cid("c2")).unwrap();

        assert_eq!(dir.members(&gid("g1")).unwrap(), &before);
    }
}
