//! Inbound event dispatch.
//!
//! One function per client operation, all funneled through
//! [`handle_frame`]. Every handler acquires the state lock once and runs to
//! completion under it, so checks and notifications can never interleave
//! with another session's operation. The only work that escapes the lock is
//! the private-delivery retry chain, which is spawned after its policy
//! checks pass.

use std::sync::Arc;

use metrics::{counter, gauge};
use tracing::{debug, info};

use relay_core::events::now_timestamp;
use relay_core::ids::{ConnectionId, GroupId, MessageId, Username};
use relay_core::{ClientEvent, RelayError, ServerEvent};
use relay_logging::LogCategory;

use crate::connection::ClientConnection;
use crate::delivery::{broadcast_to_all, broadcast_to_group, send_to_user, spawn_private_delivery};
use crate::state::{RelayState, SharedState};

/// Parse and dispatch one inbound text frame.
pub async fn handle_frame(shared: &SharedState, connection: &Arc<ClientConnection>, raw: &str) {
    let event = match ClientEvent::parse(raw) {
        Ok(event) => event,
        Err(err) => {
            debug!(conn_id = %connection.id, %err, "rejected frame");
            let _ = connection.send_event(&ServerEvent::error(&err));
            return;
        }
    };

    match event {
        ClientEvent::Register { username } => handle_register(shared, connection, username).await,
        ClientEvent::Heartbeat => handle_heartbeat(shared, connection).await,
        ClientEvent::CreateGroup { group_id } => {
            handle_create_group(shared, connection, group_id).await;
        }
        ClientEvent::JoinGroup { group_id } => handle_join_group(shared, connection, group_id).await,
        ClientEvent::LeaveGroup { group_id } => {
            handle_leave_group(shared, connection, group_id).await;
        }
        ClientEvent::GroupMessage {
            group_id,
            content,
            message_id,
        } => handle_group_message(shared, connection, group_id, content, message_id).await,
        ClientEvent::PrivateMessage {
            to,
            content,
            message_id,
        } => handle_private_message(shared, connection, to, content, message_id).await,
        ClientEvent::Typing {
            chat_key,
            is_typing,
        } => handle_typing(shared, connection, chat_key, is_typing).await,
        ClientEvent::MessageRead { message_id, from } => {
            handle_message_read(shared, connection, message_id, from).await;
        }
        ClientEvent::SendFriendRequest { to } => {
            handle_send_friend_request(shared, connection, to).await;
        }
        ClientEvent::AcceptFriendRequest { from } => {
            handle_accept_friend_request(shared, connection, from).await;
        }
        ClientEvent::DeclineFriendRequest { from } => {
            handle_decline_friend_request(shared, connection, from).await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration and presence
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_register(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    username: Username,
) {
    // Blank names and repeat registrations on the same connection are
    // ignored without a response.
    if username.is_blank() {
        return;
    }

    let mut state = shared.write().await;
    if state.registry.get(&connection.id).is_some() {
        return;
    }

    let stored = match state.registry.register(&username, connection.clone()) {
        Ok(stored) => stored,
        Err(err) => {
            info!(conn_id = %connection.id, %username, "registration rejected, closing");
            let _ = connection.send_event(&ServerEvent::register_error(&err));
            connection.force_close();
            return;
        }
    };

    state.friends.ensure_record(&stored);
    counter!("sessions_registered_total").increment(1);
    gauge!("sessions_active").increment(1.0);
    info!(conn_id = %connection.id, username = %stored, "session registered");

    let _ = connection.send_event(&ServerEvent::registered(stored.clone()));
    let _ = connection.send_event(&ServerEvent::InitialData {
        groups: state.group_snapshot(),
        users: state.registry.online_users(),
        all_users: state.registry.known_users(),
        friends: state.friends.friends_of(&stored),
        friend_requests: state.friends.request_sets(&stored),
    });

    let update = ServerEvent::UserListUpdate {
        users: state.registry.online_users(),
    };
    let _ = broadcast_to_all(&state, &update, Some(&connection.id));

    state.log.record(
        LogCategory::System,
        "server",
        Some(stored.as_str()),
        "User registered and connected",
    );
}

async fn handle_heartbeat(shared: &SharedState, connection: &Arc<ClientConnection>) {
    let state = shared.read().await;
    if state.registry.heartbeat(&connection.id) {
        let _ = connection.send_event(&ServerEvent::HeartbeatAck);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Groups
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_create_group(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    group_id: Option<GroupId>,
) {
    let mut state = shared.write().await;
    let Some(session) = state.registry.get(&connection.id) else {
        let _ = connection.send_event(&ServerEvent::error(&RelayError::NotRegistered));
        return;
    };
    let username = session.username.clone();

    let group_id = match group_id {
        Some(id) if !id.trim().is_empty() => GroupId::from(id.trim()),
        _ => GroupId::generate(),
    };

    if let Err(err) = state.groups.create(&group_id, &connection.id) {
        let _ = connection.send_event(&ServerEvent::error(&err));
        return;
    }
    if let Some(session) = state.registry.get_mut(&connection.id) {
        let _ = session.joined_groups.insert(group_id.clone());
    }
    counter!("groups_created_total").increment(1);

    let _ = connection.send_event(&ServerEvent::GroupCreated {
        group_id: group_id.clone(),
    });
    let update = ServerEvent::GroupListUpdate {
        groups: state.group_snapshot(),
    };
    let _ = broadcast_to_all(&state, &update, None);

    state.log.record(
        LogCategory::System,
        username.as_str(),
        Some(group_id.as_str()),
        &format!("Created group \"{group_id}\""),
    );
}

async fn handle_join_group(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    group_id: GroupId,
) {
    let mut state = shared.write().await;
    let Some(session) = state.registry.get(&connection.id) else {
        let _ = connection.send_event(&ServerEvent::error(&RelayError::NotRegistered));
        return;
    };
    let username = session.username.clone();

    if let Err(err) = state.groups.join(&group_id, &connection.id) {
        let _ = connection.send_event(&ServerEvent::error(&err));
        return;
    }
    if let Some(session) = state.registry.get_mut(&connection.id) {
        let _ = session.joined_groups.insert(group_id.clone());
    }

    let _ = connection.send_event(&ServerEvent::GroupJoined {
        group_id: group_id.clone(),
    });
    let joined = ServerEvent::MemberJoined {
        group_id: group_id.clone(),
        username: username.clone(),
        timestamp: now_timestamp(),
    };
    let _ = broadcast_to_group(&state, &group_id, &joined, Some(&connection.id));

    state.log.record(
        LogCategory::System,
        username.as_str(),
        Some(group_id.as_str()),
        &format!("Joined group \"{group_id}\""),
    );
}

async fn handle_leave_group(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    group_id: GroupId,
) {
    let mut state = shared.write().await;
    let Some(session) = state.registry.get(&connection.id) else {
        return;
    };
    let username = session.username.clone();

    let deleted = match state.groups.leave(&group_id, &connection.id) {
        Ok(deleted) => deleted,
        Err(err) => {
            let _ = connection.send_event(&ServerEvent::error(&err));
            return;
        }
    };
    if let Some(session) = state.registry.get_mut(&connection.id) {
        let _ = session.joined_groups.remove(&group_id);
    }

    let _ = connection.send_event(&ServerEvent::GroupLeft {
        group_id: group_id.clone(),
    });
    let left = ServerEvent::MemberLeft {
        group_id: group_id.clone(),
        username: username.clone(),
        timestamp: now_timestamp(),
    };
    let _ = broadcast_to_group(&state, &group_id, &left, None);

    if deleted {
        let update = ServerEvent::GroupListUpdate {
            groups: state.group_snapshot(),
        };
        let _ = broadcast_to_all(&state, &update, None);
    }

    state.log.record(
        LogCategory::System,
        username.as_str(),
        Some(group_id.as_str()),
        &format!("Left group \"{group_id}\""),
    );
}

async fn handle_group_message(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    group_id: GroupId,
    content: String,
    message_id: Option<MessageId>,
) {
    let state = shared.read().await;
    let Some(session) = state.registry.get(&connection.id) else {
        let _ = connection.send_event(&ServerEvent::error(&RelayError::NotRegistered));
        return;
    };
    let username = session.username.clone();

    if !session.joined_groups.contains(&group_id) {
        let err = RelayError::NotAMember(group_id.clone());
        let _ = connection.send_event(&ServerEvent::error(&err));
        return;
    }

    let event = ServerEvent::GroupMessage {
        group_id: group_id.clone(),
        from: username.clone(),
        content: content.clone(),
        timestamp: now_timestamp(),
        message_id: message_id.unwrap_or_else(MessageId::generate),
    };
    let delivered = broadcast_to_group(&state, &group_id, &event, Some(&connection.id));
    counter!("group_messages_total").increment(1);

    if delivered {
        state.log.record(
            LogCategory::Group,
            username.as_str(),
            Some(group_id.as_str()),
            &content,
        );
    } else {
        let _ = connection.send_event(&ServerEvent::error(&RelayError::NoActiveMembers));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Private messages
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_private_message(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    to: Username,
    content: String,
    message_id: Option<MessageId>,
) {
    // Policy checks run under the lock; the retry chain runs outside it.
    let sender = {
        let state = shared.read().await;
        let Some(session) = state.registry.get(&connection.id) else {
            let _ = connection.send_event(&ServerEvent::error(&RelayError::NotRegistered));
            return;
        };
        let sender = session.username.clone();

        if !state.friends.are_friends(&sender, &to) {
            let err = RelayError::NotFriends(to.clone());
            let _ = connection.send_event(&ServerEvent::error(&err));
            return;
        }
        sender
    };

    let _ = spawn_private_delivery(
        shared.clone(),
        sender,
        to,
        content,
        message_id.unwrap_or_else(MessageId::generate),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Typing and read receipts
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_typing(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    chat_key: String,
    is_typing: bool,
) {
    let state = shared.read().await;
    let Some(session) = state.registry.get(&connection.id) else {
        return;
    };
    let username = session.username.clone();

    let event = ServerEvent::Typing {
        chat_key: chat_key.clone(),
        username,
        is_typing,
    };

    if let Some(rest) = chat_key.strip_prefix("group:") {
        let group_id = GroupId::from(rest.split(':').next().unwrap_or(rest));
        if session.joined_groups.contains(&group_id) {
            let _ = broadcast_to_group(&state, &group_id, &event, Some(&connection.id));
        }
    } else if let Some(rest) = chat_key.strip_prefix("private:") {
        let recipient = Username::from(rest.split(':').next().unwrap_or(rest));
        let _ = send_to_user(&state, &recipient, &event);
    }
}

async fn handle_message_read(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    message_id: MessageId,
    from: Username,
) {
    let state = shared.read().await;
    let Some(session) = state.registry.get(&connection.id) else {
        return;
    };
    let event = ServerEvent::MessageRead {
        message_id,
        read_by: session.username.clone(),
    };
    let _ = send_to_user(&state, &from, &event);
}

// ─────────────────────────────────────────────────────────────────────────────
// Friend requests
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_send_friend_request(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    to: Username,
) {
    let mut state = shared.write().await;
    let Some(session) = state.registry.get(&connection.id) else {
        return;
    };
    let sender = session.username.clone();

    if let Err(err) = state.friends.send_request(&sender, &to) {
        let _ = connection.send_event(&ServerEvent::error(&err));
        return;
    }

    let _ = send_to_user(
        &state,
        &to,
        &ServerEvent::FriendRequestReceived {
            from: sender.clone(),
        },
    );
    let _ = connection.send_event(&ServerEvent::FriendRequestSent { to });
}

async fn handle_accept_friend_request(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    from: Username,
) {
    let mut state = shared.write().await;
    let Some(session) = state.registry.get(&connection.id) else {
        return;
    };
    let accepter = session.username.clone();

    let (accepter_friends, requester_friends) = match state.friends.accept(&accepter, &from) {
        Ok(lists) => lists,
        Err(err) => {
            let _ = connection.send_event(&ServerEvent::error(&err));
            return;
        }
    };

    let _ = connection.send_event(&ServerEvent::FriendRequestAccepted {
        from: from.clone(),
        friends: accepter_friends,
    });
    let _ = send_to_user(
        &state,
        &from,
        &ServerEvent::FriendRequestAccepted {
            from: accepter,
            friends: requester_friends,
        },
    );
}

async fn handle_decline_friend_request(
    shared: &SharedState,
    connection: &Arc<ClientConnection>,
    from: Username,
) {
    let mut state = shared.write().await;
    let Some(session) = state.registry.get(&connection.id) else {
        return;
    };
    let decliner = session.username.clone();

    if let Some(sets) = state.friends.decline(&decliner, &from) {
        let _ = connection.send_event(&ServerEvent::FriendRequestDeclined {
            from,
            friend_requests: sets,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disconnect cascade
// ─────────────────────────────────────────────────────────────────────────────

/// Tear down a session: leave every group, update presence, log.
///
/// Used by both the session pump on socket close and the presence sweep.
/// Idempotent; a connection that never registered is a no-op.
pub fn unregister_session(state: &mut RelayState, conn_id: &ConnectionId) {
    let Some(session) = state.registry.remove(conn_id) else {
        return;
    };
    let username = session.username.clone();
    gauge!("sessions_active").decrement(1.0);
    info!(%conn_id, %username, "session unregistered");

    for group_id in &session.joined_groups {
        let deleted = state.groups.remove_member(group_id, conn_id);

        let left = ServerEvent::MemberLeft {
            group_id: group_id.clone(),
            username: username.clone(),
            timestamp: now_timestamp(),
        };
        let _ = broadcast_to_group(state, group_id, &left, None);

        if deleted {
            state.log.record(
                LogCategory::System,
                "server",
                Some(group_id.as_str()),
                &format!("Group \"{group_id}\" deleted (empty)"),
            );
            let update = ServerEvent::GroupListUpdate {
                groups: state.group_snapshot(),
            };
            let _ = broadcast_to_all(state, &update, None);
        }
    }

    let update = ServerEvent::UserListUpdate {
        users: state.registry.online_users(),
    };
    let _ = broadcast_to_all(state, &update, Some(conn_id));

    state.log.record(
        LogCategory::System,
        "server",
        None,
        &format!("User \"{username}\" disconnected"),
    );
}

/// Lock-taking wrapper around [`unregister_session`] for async callers.
pub async fn handle_disconnect(shared: &SharedState, conn_id: &ConnectionId) {
    let mut state = shared.write().await;
    unregister_session(&mut state, conn_id);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
