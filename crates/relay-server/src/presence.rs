//! Periodic liveness sweep.
//!
//! A background task that walks the registry on a fixed interval and reaps
//! sessions whose transport already closed without a disconnect cascade, or
//! whose application heartbeat went quiet for too long. Reaped sessions go
//! through the same teardown as a normal disconnect, so group membership and
//! presence lists stay consistent however a client goes away.

use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use relay_core::ids::ConnectionId;

use crate::handlers::unregister_session;
use crate::state::SharedState;

/// Floor for the sweep interval; `tokio::time::interval` panics on zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Run the sweep loop until `cancel` fires.
pub async fn run_presence_supervisor(
    shared: SharedState,
    sweep_interval: Duration,
    stale_after: Duration,
    cancel: CancellationToken,
) {
    let sweep_interval = if sweep_interval.is_zero() {
        warn!("zero sweep interval, clamping to {MIN_SWEEP_INTERVAL:?}");
        MIN_SWEEP_INTERVAL
    } else {
        sweep_interval
    };
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a fresh server doesn't
    // sweep before anyone has had a chance to heartbeat.
    let _ = interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("presence supervisor stopping");
                return;
            }
            _ = interval.tick() => {
                let swept = sweep_once(&shared, stale_after).await;
                if swept > 0 {
                    warn!(swept, "presence sweep reaped sessions");
                }
            }
        }
    }
}

/// Run a single sweep pass. Returns the number of sessions reaped.
pub async fn sweep_once(shared: &SharedState, stale_after: Duration) -> usize {
    let mut state = shared.write().await;

    let mut victims: Vec<ConnectionId> = Vec::new();
    for (conn_id, session) in state.registry.iter() {
        if !session.connection.is_open() {
            debug!(%conn_id, username = %session.username, "reaping closed session");
            victims.push(conn_id.clone());
        } else if session.connection.heartbeat_elapsed() > stale_after {
            warn!(%conn_id, username = %session.username, "reaping stale session");
            session.connection.force_close();
            victims.push(conn_id.clone());
        }
    }

    for conn_id in &victims {
        unregister_session(&mut state, conn_id);
    }
    counter!("sessions_swept_total").increment(victims.len() as u64);
    victims.len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnection;
    use crate::state::RelayState;
    use relay_core::ids::Username;
    use relay_logging::MessageLog;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const LONG: Duration = Duration::from_secs(3600);

    async fn add_session(
        shared: &SharedState,
        id: &str,
        name: &str,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), tx));
        let mut state = shared.write().await;
        let _ = state
            .registry
            .register(&Username::from(name), conn.clone())
            .unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn sweep_reaps_closed_connections() {
        let shared = RelayState::shared(MessageLog::disabled());
        let (alice, _alice_rx) = add_session(&shared, "c1", "alice").await;
        let (_bob, mut bob_rx) = add_session(&shared, "c2", "bob").await;
        alice.mark_closed();

        assert_eq!(sweep_once(&shared, LONG).await, 1);

        let state = shared.read().await;
        assert!(state.registry.resolve(&Username::from("alice")).is_none());
        assert!(state.registry.resolve(&Username::from("bob")).is_some());
        drop(state);

        // The survivor hears about the departure.
        let frame = bob_rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "user_list_update");
        assert_eq!(parsed["users"], serde_json::json!(["bob"]));
    }

    #[tokio::test]
    async fn sweep_force_closes_stale_sessions() {
        let shared = RelayState::shared(MessageLog::disabled());
        let (alice, _rx) = add_session(&shared, "c1", "alice").await;

        // Zero threshold makes any session stale.
        assert_eq!(sweep_once(&shared, Duration::ZERO).await, 1);

        assert!(!alice.is_open());
        assert!(alice.close_token().is_cancelled());
        let state = shared.read().await;
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_sessions() {
        let shared = RelayState::shared(MessageLog::disabled());
        let (alice, _rx) = add_session(&shared, "c1", "alice").await;
        alice.mark_heartbeat();

        assert_eq!(sweep_once(&shared, LONG).await, 0);
        let state = shared.read().await;
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn sweep_on_empty_registry_is_noop() {
        let shared = RelayState::shared(MessageLog::disabled());
        assert_eq!(sweep_once(&shared, LONG).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_sweeps_on_interval() {
        let shared = RelayState::shared(MessageLog::disabled());
        let (alice, _rx) = add_session(&shared, "c1", "alice").await;
        alice.mark_closed();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_presence_supervisor(
            shared.clone(),
            Duration::from_secs(30),
            LONG,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        let state = shared.read().await;
        assert!(state.registry.is_empty());
        drop(state);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_survives_zero_interval() {
        let shared = RelayState::shared(MessageLog::disabled());
        let (alice, _rx) = add_session(&shared, "c1", "alice").await;
        alice.mark_closed();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_presence_supervisor(
            shared.clone(),
            Duration::ZERO,
            LONG,
            cancel.clone(),
        ));

        // The clamped interval still sweeps instead of panicking the task.
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        let state = shared.read().await;
        assert!(state.registry.is_empty());
        drop(state);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_stops_on_cancel() {
        let shared = RelayState::shared(MessageLog::disabled());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_presence_supervisor(
            shared,
            Duration::from_secs(30),
            LONG,
            cancel.clone(),
        ));
        cancel.cancel();
        handle.await.unwrap();
    }
}
