//! Error hierarchy for the relay.
//!
//! Every variant's `Display` string is the exact human-readable message the
//! triggering client receives. Errors are classified by [`ErrorKind`]:
//! protocol errors and policy errors leave the connection open and mutate
//! nothing; delivery failures are non-fatal and never roll back state;
//! fatal errors close the connection.

use thiserror::Error;

use crate::ids::{GroupId, Username};

/// Broad classification used by the dispatcher to decide what happens to
/// the connection after the error is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unparseable or unrecognized frame. Connection stays open.
    Protocol,
    /// Request violated a state rule. No mutation happened.
    Policy,
    /// A send reached nobody. State already mutated stays mutated.
    Delivery,
    /// The connection must be closed after reporting.
    Fatal,
}

/// Everything that can go wrong handling a client event.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    // ── Protocol ────────────────────────────────────────────────────────────
    /// Frame was not valid JSON or did not match any event shape.
    #[error("Invalid message format")]
    InvalidFormat,

    /// Well-formed JSON with an unrecognized `type` tag.
    #[error("Unknown message type")]
    UnknownType,

    // ── Registration ────────────────────────────────────────────────────────
    /// Another live session already holds this name (case-insensitive).
    #[error("Username already taken. Please choose another.")]
    UsernameTaken,

    /// The event requires a registered session.
    #[error("You must be registered first")]
    NotRegistered,

    // ── Groups ──────────────────────────────────────────────────────────────
    /// Explicit group id collided with an existing group.
    #[error("Group \"{0}\" already exists")]
    GroupExists(GroupId),

    /// No group with this id.
    #[error("Group \"{0}\" does not exist")]
    GroupNotFound(GroupId),

    /// Join requested by an existing member.
    #[error("You are already a member of \"{0}\"")]
    AlreadyMember(GroupId),

    /// Leave or group send by a non-member.
    #[error("You are not a member of \"{0}\"")]
    NotAMember(GroupId),

    /// Group broadcast reached no live member.
    #[error("Message could not be delivered (no active members)")]
    NoActiveMembers,

    // ── Friends ─────────────────────────────────────────────────────────────
    /// Friend request addressed to the sender themself.
    #[error("Cannot send friend request to yourself")]
    SelfFriendRequest,

    /// The pair is already in each other's friends set.
    #[error("{0} is already your friend")]
    AlreadyFriends(Username),

    /// An identical pending request already exists.
    #[error("Friend request already sent")]
    RequestAlreadySent,

    /// Accept/decline referenced no pending request.
    #[error("Friend request not found")]
    RequestNotFound,

    /// Private message to someone outside the sender's friends set.
    #[error("You must be friends with {0} to send private messages")]
    NotFriends(Username),

    // ── Delivery ────────────────────────────────────────────────────────────
    /// Private delivery exhausted every attempt.
    #[error("User \"{0}\" is not online or unreachable after retries")]
    RecipientUnreachable(Username),
}

impl RelayError {
    /// Classification for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat | Self::UnknownType => ErrorKind::Protocol,
            Self::UsernameTaken => ErrorKind::Fatal,
            Self::NoActiveMembers | Self::RecipientUnreachable(_) => ErrorKind::Delivery,
            _ => ErrorKind::Policy,
        }
    }

    /// Whether the connection should be closed after reporting this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings_are_client_facing() {
        assert_eq!(
            RelayError::UsernameTaken.to_string(),
            "Username already taken. Please choose another."
        );
        assert_eq!(
            RelayError::GroupNotFound(GroupId::from("g1")).to_string(),
            "Group \"g1\" does not exist"
        );
        assert_eq!(
            RelayError::NotFriends(Username::from("bob")).to_string(),
            "You must be friends with bob to send private messages"
        );
        assert_eq!(
            RelayError::RecipientUnreachable(Username::from("bob")).to_string(),
            "User \"bob\" is not online or unreachable after retries"
        );
    }

    #[test]
    fn duplicate_username_is_the_only_fatal_error() {
        assert!(RelayError::UsernameTaken.is_fatal());
        assert!(!RelayError::InvalidFormat.is_fatal());
        assert!(!RelayError::NotRegistered.is_fatal());
        assert!(!RelayError::RecipientUnreachable(Username::from("x")).is_fatal());
    }

    #[test]
    fn kinds_partition_the_taxonomy() {
        assert_eq!(RelayError::InvalidFormat.kind(), ErrorKind::Protocol);
        assert_eq!(RelayError::UnknownType.kind(), ErrorKind::Protocol);
        assert_eq!(
            RelayError::AlreadyMember(GroupId::from("g")).kind(),
            ErrorKind::Policy
        );
        assert_eq!(RelayError::NoActiveMembers.kind(), ErrorKind::Delivery);
        assert_eq!(RelayError::SelfFriendRequest.kind(), ErrorKind::Policy);
    }
}
