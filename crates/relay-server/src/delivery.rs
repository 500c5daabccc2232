//! Delivery engine: fan-out primitives and the private-message retry chain.
//!
//! Events are serialized once per fan-out and shared as `Arc<String>` across
//! recipients. A delivery counts only when the frame was actually enqueued
//! to a live transport.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use relay_core::constants::{
    DELIVERED_SIGNAL_DELAY_MS, DELIVERY_RETRY_SPACING_MS, MAX_DELIVERY_ATTEMPTS,
};
use relay_core::events::now_timestamp;
use relay_core::ids::{ConnectionId, GroupId, MessageId, Username};
use relay_core::{RelayError, ServerEvent};
use relay_logging::LogCategory;

use crate::state::{RelayState, SharedState};

/// Broadcast an event to every live session, optionally excluding one
/// connection. Returns the number of sessions reached.
pub fn broadcast_to_all(
    state: &RelayState,
    event: &ServerEvent,
    exclude: Option<&ConnectionId>,
) -> usize {
    let Ok(json) = serde_json::to_string(event) else {
        warn!(event_type = event.event_type(), "failed to serialize event");
        return 0;
    };
    let frame = Arc::new(json);

    let mut reached = 0;
    for (conn_id, session) in state.registry.iter() {
        if exclude == Some(conn_id) {
            continue;
        }
        if session.connection.send_raw(frame.clone()) {
            reached += 1;
        }
    }
    reached
}

/// Broadcast an event to a group's live members, optionally excluding one
/// connection. Returns `true` when at least one member received it.
pub fn broadcast_to_group(
    state: &RelayState,
    group_id: &GroupId,
    event: &ServerEvent,
    exclude: Option<&ConnectionId>,
) -> bool {
    let Some(members) = state.groups.members(group_id) else {
        return false;
    };
    let Ok(json) = serde_json::to_string(event) else {
        warn!(event_type = event.event_type(), "failed to serialize event");
        return false;
    };
    let frame = Arc::new(json);

    let mut delivered = false;
    for conn_id in members {
        if exclude == Some(conn_id) {
            continue;
        }
        if let Some(session) = state.registry.get(conn_id) {
            if session.connection.send_raw(frame.clone()) {
                delivered = true;
            }
        }
    }
    delivered
}

/// Send an event to one user via the username index.
///
/// Returns `false` when the user has no live session or the enqueue failed.
pub fn send_to_user(state: &RelayState, username: &Username, event: &ServerEvent) -> bool {
    state
        .registry
        .resolve(username)
        .is_some_and(|session| session.connection.send_event(event))
}

/// Deliver a private message with retries.
///
/// The spawned task carries only the recipient's name, the serialized
/// envelope, and an attempts-remaining counter; the recipient's session is
/// re-resolved from the live index at every firing, so a recipient who
/// reconnects mid-chain still gets the message. Attempts are spaced
/// [`DELIVERY_RETRY_SPACING_MS`] apart, [`MAX_DELIVERY_ATTEMPTS`] in total.
///
/// On first success the sender gets a `private_message_sent` ack at once
/// and a `message_delivered` signal [`DELIVERED_SIGNAL_DELAY_MS`] later; on
/// exhaustion the sender gets a delivery error. All sender-facing frames
/// re-resolve the sender too and are silently dropped if the sender is
/// gone. The chain outlives the sender's connection by design of the
/// protocol: a disconnect never cancels in-flight deliveries.
///
/// Returns a handle resolving to whether delivery succeeded.
pub fn spawn_private_delivery(
    shared: SharedState,
    sender: Username,
    recipient: Username,
    content: String,
    message_id: MessageId,
) -> JoinHandle<bool> {
    let envelope = ServerEvent::PrivateMessage {
        from: sender.clone(),
        content: content.clone(),
        timestamp: now_timestamp(),
        message_id: message_id.clone(),
    };

    tokio::spawn(async move {
        let mut attempts_left = MAX_DELIVERY_ATTEMPTS;
        loop {
            let delivered = {
                let state = shared.read().await;
                send_to_user(&state, &recipient, &envelope)
            };

            if delivered {
                counter!("private_deliveries_total").increment(1);
                confirm_to_sender(&shared, &sender, &recipient, &content, &message_id).await;
                return true;
            }

            attempts_left -= 1;
            if attempts_left == 0 {
                counter!("private_delivery_failures_total").increment(1);
                let state = shared.read().await;
                let err = RelayError::RecipientUnreachable(recipient.clone());
                if !send_to_user(&state, &sender, &ServerEvent::error(&err)) {
                    debug!(%sender, "sender gone, dropping delivery failure notice");
                }
                return false;
            }

            counter!("private_delivery_retries_total").increment(1);
            debug!(%recipient, attempts_left, "recipient unreachable, retrying");
            tokio::time::sleep(Duration::from_millis(DELIVERY_RETRY_SPACING_MS)).await;
        }
    })
}

/// Ack the sender, log the message, and schedule the delivered signal.
async fn confirm_to_sender(
    shared: &SharedState,
    sender: &Username,
    recipient: &Username,
    content: &str,
    message_id: &MessageId,
) {
    {
        let state = shared.read().await;
        let ack = ServerEvent::PrivateMessageSent {
            to: recipient.clone(),
            message_id: message_id.clone(),
            timestamp: now_timestamp(),
        };
        let _ = send_to_user(&state, sender, &ack);
        state.log.record(
            LogCategory::Private,
            sender.as_str(),
            Some(recipient.as_str()),
            content,
        );
    }

    let shared = shared.clone();
    let sender = sender.clone();
    let message_id = message_id.clone();
    let _handle: JoinHandle<()> = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(DELIVERED_SIGNAL_DELAY_MS)).await;
        let state = shared.read().await;
        let event = ServerEvent::MessageDelivered {
            message_id: message_id.clone(),
        };
        if !send_to_user(&state, &sender, &event) {
            debug!(%sender, "sender gone, dropping delivered signal");
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnection;
    use relay_logging::MessageLog;
    use tokio::sync::mpsc;

    fn user(s: &str) -> Username {
        Username::from(s)
    }

    /// Register a user on a fresh connection, returning the frame receiver.
    fn add_session(state: &mut RelayState, name: &str) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(64);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::from(format!("conn_{name}")),
            tx,
        ));
        state.registry.register(&user(name), conn).unwrap();
        rx
    }

    fn next_frame(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
        let frame = rx.try_recv().expect("expected a frame");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn broadcast_to_all_excludes_one() {
        let mut state = RelayState::new(MessageLog::disabled());
        let mut alice = add_session(&mut state, "alice");
        let mut bob = add_session(&mut state, "bob");

        let reached = broadcast_to_all(
            &state,
            &ServerEvent::HeartbeatAck,
            Some(&ConnectionId::from("conn_alice")),
        );
        assert_eq!(reached, 1);
        assert!(alice.try_recv().is_err());
        assert_eq!(next_frame(&mut bob)["type"], "heartbeat_ack");
    }

    #[tokio::test]
    async fn group_broadcast_excludes_sender_and_reports_delivery() {
        let mut state = RelayState::new(MessageLog::disabled());
        let mut alice = add_session(&mut state, "alice");
        let mut bob = add_session(&mut state, "bob");
        let gid = GroupId::from("g1");
        state.groups.create(&gid, &ConnectionId::from("conn_alice")).unwrap();
        state.groups.join(&gid, &ConnectionId::from("conn_bob")).unwrap();

        let event = ServerEvent::GroupMessage {
            group_id: gid.clone(),
            from: user("alice"),
            content: "hi".into(),
            timestamp: now_timestamp(),
            message_id: MessageId::from("m1"),
        };
        let delivered =
            broadcast_to_group(&state, &gid, &event, Some(&ConnectionId::from("conn_alice")));

        assert!(delivered);
        assert!(alice.try_recv().is_err());
        assert_eq!(next_frame(&mut bob)["content"], "hi");
    }

    #[tokio::test]
    async fn group_broadcast_with_no_other_live_member_is_undelivered() {
        let mut state = RelayState::new(MessageLog::disabled());
        let _alice = add_session(&mut state, "alice");
        let gid = GroupId::from("g1");
        state.groups.create(&gid, &ConnectionId::from("conn_alice")).unwrap();

        let delivered = broadcast_to_group(
            &state,
            &gid,
            &ServerEvent::HeartbeatAck,
            Some(&ConnectionId::from("conn_alice")),
        );
        assert!(!delivered);
    }

    #[tokio::test]
    async fn send_to_user_fails_for_offline() {
        let state = RelayState::new(MessageLog::disabled());
        assert!(!send_to_user(&state, &user("ghost"), &ServerEvent::HeartbeatAck));
    }

    #[tokio::test(start_paused = true)]
    async fn private_delivery_first_attempt_acks_then_confirms() {
        let shared = RelayState::shared(MessageLog::disabled());
        let (mut alice, mut bob);
        {
            let mut state = shared.write().await;
            alice = add_session(&mut state, "alice");
            bob = add_session(&mut state, "bob");
        }

        let handle = spawn_private_delivery(
            shared.clone(),
            user("alice"),
            user("bob"),
            "hello".into(),
            MessageId::from("m1"),
        );

        // Let the first attempt and the delayed delivered-signal fire.
        tokio::time::sleep(Duration::from_millis(DELIVERED_SIGNAL_DELAY_MS + 50)).await;
        assert!(handle.await.unwrap());

        let msg = next_frame(&mut bob);
        assert_eq!(msg["type"], "private_message");
        assert_eq!(msg["from"], "alice");
        assert_eq!(msg["content"], "hello");

        let ack = next_frame(&mut alice);
        assert_eq!(ack["type"], "private_message_sent");
        assert_eq!(ack["to"], "bob");
        assert_eq!(ack["messageId"], "m1");

        let delivered = next_frame(&mut alice);
        assert_eq!(delivered["type"], "message_delivered");
        assert_eq!(delivered["messageId"], "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn private_delivery_retries_until_recipient_returns() {
        let shared = RelayState::shared(MessageLog::disabled());
        let mut alice;
        {
            let mut state = shared.write().await;
            alice = add_session(&mut state, "alice");
        }

        let handle = spawn_private_delivery(
            shared.clone(),
            user("alice"),
            user("bob"),
            "hello again".into(),
            MessageId::from("m2"),
        );

        // First attempt fails; bob connects during the retry gap.
        tokio::time::sleep(Duration::from_millis(DELIVERY_RETRY_SPACING_MS / 2)).await;
        let mut bob = {
            let mut state = shared.write().await;
            add_session(&mut state, "bob")
        };
        tokio::time::sleep(Duration::from_millis(2 * DELIVERY_RETRY_SPACING_MS)).await;

        assert!(handle.await.unwrap());
        let msg = next_frame(&mut bob);
        assert_eq!(msg["type"], "private_message");
        assert_eq!(msg["content"], "hello again");

        let ack = next_frame(&mut alice);
        assert_eq!(ack["type"], "private_message_sent");
    }

    #[tokio::test(start_paused = true)]
    async fn private_delivery_exhaustion_reports_to_sender() {
        let shared = RelayState::shared(MessageLog::disabled());
        let mut alice;
        {
            let mut state = shared.write().await;
            alice = add_session(&mut state, "alice");
        }

        let handle = spawn_private_delivery(
            shared.clone(),
            user("alice"),
            user("bob"),
            "into the void".into(),
            MessageId::from("m3"),
        );

        assert!(!handle.await.unwrap());
        let err = next_frame(&mut alice);
        assert_eq!(err["type"], "error");
        assert_eq!(
            err["message"],
            "User \"bob\" is not online or unreachable after retries"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_with_sender_gone_is_silent() {
        let shared = RelayState::shared(MessageLog::disabled());
        {
            let mut state = shared.write().await;
            let _alice = add_session(&mut state, "alice");
            // Sender disconnects before the chain finishes.
        }
        {
            let mut state = shared.write().await;
            let _ = state.registry.remove(&ConnectionId::from("conn_alice"));
        }

        let handle = spawn_private_delivery(
            shared.clone(),
            user("alice"),
            user("bob"),
            "orphaned".into(),
            MessageId::from("m4"),
        );

        // Must complete without panicking even though nobody is listening.
        assert!(!handle.await.unwrap());
    }
}
