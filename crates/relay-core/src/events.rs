//! Wire protocol events.
//!
//! Every frame on the WebSocket is a JSON object with a `type` tag.
//! [`ClientEvent`] covers inbound frames, [`ServerEvent`] outbound ones.
//! The tag strings and field names here are the protocol contract and
//! must not drift.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;
use crate::ids::{GroupId, MessageId, Username};

// ─────────────────────────────────────────────────────────────────────────────
// Shared payload fragments
// ─────────────────────────────────────────────────────────────────────────────

/// One group as reported to clients: id, live member count, live members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Group identifier.
    pub group_id: GroupId,
    /// Number of currently connected members.
    pub member_count: usize,
    /// Usernames of currently connected members.
    pub members: Vec<Username>,
}

/// Pending friend requests from one user's point of view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequestSets {
    /// Requests this user sent that are still pending.
    pub sent: Vec<Username>,
    /// Requests this user received that are still pending.
    pub received: Vec<Username>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound events
// ─────────────────────────────────────────────────────────────────────────────

/// Frames a client may send.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Claim a display name for this connection.
    #[serde(rename = "register")]
    Register {
        /// Requested display name.
        username: Username,
    },

    /// Liveness signal.
    #[serde(rename = "heartbeat")]
    Heartbeat,

    /// Create a group, optionally with a chosen id.
    #[serde(rename = "create_group")]
    CreateGroup {
        /// Explicit group id; a fresh one is generated when absent or blank.
        #[serde(default, rename = "groupId")]
        group_id: Option<GroupId>,
    },

    /// Join an existing group.
    #[serde(rename = "join_group")]
    JoinGroup {
        /// Target group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },

    /// Leave a group.
    #[serde(rename = "leave_group")]
    LeaveGroup {
        /// Target group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },

    /// Send a message to every other member of a group.
    #[serde(rename = "group_message")]
    GroupMessage {
        /// Target group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
        /// Message body.
        content: String,
        /// Client-chosen id; generated server-side when absent.
        #[serde(default, rename = "messageId")]
        message_id: Option<MessageId>,
    },

    /// Send a direct message to a friend.
    #[serde(rename = "private_message")]
    PrivateMessage {
        /// Recipient username.
        to: Username,
        /// Message body.
        content: String,
        /// Client-chosen id; generated server-side when absent.
        #[serde(default, rename = "messageId")]
        message_id: Option<MessageId>,
    },

    /// Typing indicator for a group or private chat.
    #[serde(rename = "typing")]
    Typing {
        /// `group:<id>` or `private:<username>`.
        #[serde(rename = "chatKey")]
        chat_key: String,
        /// Whether the client started or stopped typing.
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },

    /// Read receipt, relayed to the message's original sender.
    #[serde(rename = "message_read")]
    MessageRead {
        /// The message that was read.
        #[serde(rename = "messageId")]
        message_id: MessageId,
        /// Username of the original sender.
        from: Username,
    },

    /// Offer friendship to another user.
    #[serde(rename = "send_friend_request")]
    SendFriendRequest {
        /// Target username.
        to: Username,
    },

    /// Accept a pending request.
    #[serde(rename = "accept_friend_request")]
    AcceptFriendRequest {
        /// Username that sent the request.
        from: Username,
    },

    /// Decline a pending request.
    #[serde(rename = "decline_friend_request")]
    DeclineFriendRequest {
        /// Username that sent the request.
        from: Username,
    },
}

impl ClientEvent {
    const KNOWN_TYPES: &'static [&'static str] = &[
        "register",
        "heartbeat",
        "create_group",
        "join_group",
        "leave_group",
        "group_message",
        "private_message",
        "typing",
        "message_read",
        "send_friend_request",
        "accept_friend_request",
        "decline_friend_request",
    ];

    /// Parse a raw text frame.
    ///
    /// Distinguishes an unrecognized `type` tag ([`RelayError::UnknownType`])
    /// from everything else malformed ([`RelayError::InvalidFormat`]), so
    /// the two get their distinct client-facing messages.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| RelayError::InvalidFormat)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(RelayError::InvalidFormat)?;
        if !Self::KNOWN_TYPES.contains(&tag) {
            return Err(RelayError::UnknownType);
        }
        serde_json::from_value(value).map_err(|_| RelayError::InvalidFormat)
    }

    /// The wire tag for this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Heartbeat => "heartbeat",
            Self::CreateGroup { .. } => "create_group",
            Self::JoinGroup { .. } => "join_group",
            Self::LeaveGroup { .. } => "leave_group",
            Self::GroupMessage { .. } => "group_message",
            Self::PrivateMessage { .. } => "private_message",
            Self::Typing { .. } => "typing",
            Self::MessageRead { .. } => "message_read",
            Self::SendFriendRequest { .. } => "send_friend_request",
            Self::AcceptFriendRequest { .. } => "accept_friend_request",
            Self::DeclineFriendRequest { .. } => "decline_friend_request",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound events
// ─────────────────────────────────────────────────────────────────────────────

/// Frames the server may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Registration succeeded.
    #[serde(rename = "registered")]
    Registered {
        /// The name as registered.
        username: Username,
        /// Fixed confirmation text.
        message: String,
    },

    /// Registration failed; the connection is closed right after this frame.
    #[serde(rename = "register_error")]
    RegisterError {
        /// Human-readable reason.
        message: String,
    },

    /// Full state snapshot sent once, immediately after `registered`.
    #[serde(rename = "initial_data")]
    InitialData {
        /// All groups with live membership.
        groups: Vec<GroupSummary>,
        /// Currently online usernames.
        users: Vec<Username>,
        /// Every username ever registered, online or not.
        #[serde(rename = "allUsers")]
        all_users: Vec<Username>,
        /// The new session's friends.
        friends: Vec<Username>,
        /// The new session's pending requests.
        #[serde(rename = "friendRequests")]
        friend_requests: FriendRequestSets,
    },

    /// Group set changed (created or deleted).
    #[serde(rename = "group_list_update")]
    GroupListUpdate {
        /// All groups with live membership.
        groups: Vec<GroupSummary>,
    },

    /// Online-user set changed.
    #[serde(rename = "user_list_update")]
    UserListUpdate {
        /// Currently online usernames.
        users: Vec<Username>,
    },

    /// Ack to the creator of a new group.
    #[serde(rename = "group_created")]
    GroupCreated {
        /// The new group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },

    /// Ack to a successful joiner.
    #[serde(rename = "group_joined")]
    GroupJoined {
        /// The joined group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },

    /// Ack to a successful leaver.
    #[serde(rename = "group_left")]
    GroupLeft {
        /// The left group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },

    /// Someone joined a group you are in.
    #[serde(rename = "member_joined")]
    MemberJoined {
        /// The group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
        /// Who joined.
        username: Username,
        /// ISO-8601 event time.
        timestamp: String,
    },

    /// Someone left a group you are in.
    #[serde(rename = "member_left")]
    MemberLeft {
        /// The group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
        /// Who left.
        username: Username,
        /// ISO-8601 event time.
        timestamp: String,
    },

    /// A message sent to a group you are in.
    #[serde(rename = "group_message")]
    GroupMessage {
        /// The group.
        #[serde(rename = "groupId")]
        group_id: GroupId,
        /// Sender username.
        from: Username,
        /// Message body.
        content: String,
        /// ISO-8601 send time.
        timestamp: String,
        /// Message identifier.
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },

    /// A direct message from a friend.
    #[serde(rename = "private_message")]
    PrivateMessage {
        /// Sender username.
        from: Username,
        /// Message body.
        content: String,
        /// ISO-8601 send time.
        timestamp: String,
        /// Message identifier.
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },

    /// Ack to the sender after the first successful private delivery.
    #[serde(rename = "private_message_sent")]
    PrivateMessageSent {
        /// Recipient username.
        to: Username,
        /// Message identifier.
        #[serde(rename = "messageId")]
        message_id: MessageId,
        /// ISO-8601 ack time.
        timestamp: String,
    },

    /// Delayed delivery confirmation to the sender.
    #[serde(rename = "message_delivered")]
    MessageDelivered {
        /// Message identifier.
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },

    /// Read receipt relayed to the original sender.
    #[serde(rename = "message_read")]
    MessageRead {
        /// The message that was read.
        #[serde(rename = "messageId")]
        message_id: MessageId,
        /// Who read it.
        #[serde(rename = "readBy")]
        read_by: Username,
    },

    /// Ack to a friend-request sender.
    #[serde(rename = "friend_request_sent")]
    FriendRequestSent {
        /// Target username.
        to: Username,
    },

    /// A friend request arrived.
    #[serde(rename = "friend_request_received")]
    FriendRequestReceived {
        /// Who sent it.
        from: Username,
    },

    /// A friendship was established; sent to both parties.
    #[serde(rename = "friend_request_accepted")]
    FriendRequestAccepted {
        /// The other party.
        from: Username,
        /// The receiver's updated friends list.
        friends: Vec<Username>,
    },

    /// A request was declined; sent to the decliner only.
    #[serde(rename = "friend_request_declined")]
    FriendRequestDeclined {
        /// Who had sent the declined request.
        from: Username,
        /// The decliner's updated pending sets.
        #[serde(rename = "friendRequests")]
        friend_requests: FriendRequestSets,
    },

    /// Typing indicator relayed to the chat's other participants.
    #[serde(rename = "typing")]
    Typing {
        /// `group:<id>` or `private:<username>`.
        #[serde(rename = "chatKey")]
        chat_key: String,
        /// Who is typing.
        username: Username,
        /// Whether they started or stopped.
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },

    /// Response to an inbound heartbeat.
    #[serde(rename = "heartbeat_ack")]
    HeartbeatAck,

    /// Non-fatal error report; always sender-only.
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason. The only field clients get.
        message: String,
    },
}

impl ServerEvent {
    /// The wire tag for this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::RegisterError { .. } => "register_error",
            Self::InitialData { .. } => "initial_data",
            Self::GroupListUpdate { .. } => "group_list_update",
            Self::UserListUpdate { .. } => "user_list_update",
            Self::GroupCreated { .. } => "group_created",
            Self::GroupJoined { .. } => "group_joined",
            Self::GroupLeft { .. } => "group_left",
            Self::MemberJoined { .. } => "member_joined",
            Self::MemberLeft { .. } => "member_left",
            Self::GroupMessage { .. } => "group_message",
            Self::PrivateMessage { .. } => "private_message",
            Self::PrivateMessageSent { .. } => "private_message_sent",
            Self::MessageDelivered { .. } => "message_delivered",
            Self::MessageRead { .. } => "message_read",
            Self::FriendRequestSent { .. } => "friend_request_sent",
            Self::FriendRequestReceived { .. } => "friend_request_received",
            Self::FriendRequestAccepted { .. } => "friend_request_accepted",
            Self::FriendRequestDeclined { .. } => "friend_request_declined",
            Self::Typing { .. } => "typing",
            Self::HeartbeatAck => "heartbeat_ack",
            Self::Error { .. } => "error",
        }
    }

    /// Successful-registration ack with the fixed confirmation text.
    #[must_use]
    pub fn registered(username: Username) -> Self {
        Self::Registered {
            username,
            message: "Successfully registered".to_owned(),
        }
    }

    /// Error frame from a [`RelayError`], carrying only its display string.
    #[must_use]
    pub fn error(err: &RelayError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    /// `register_error` frame from a [`RelayError`].
    #[must_use]
    pub fn register_error(err: &RelayError) -> Self {
        Self::RegisterError {
            message: err.to_string(),
        }
    }
}

/// Current time as the ISO-8601 string used in event timestamps.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
