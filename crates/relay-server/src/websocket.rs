//! WebSocket upgrade endpoint and per-connection session pump.
//!
//! Each accepted socket gets a [`ClientConnection`] and two halves: a write
//! task draining the connection's outbound channel into the socket, and the
//! read loop feeding inbound frames to [`handle_frame`]. Teardown always
//! funnels through the disconnect cascade, whichever side ends the session.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info};

use relay_core::ids::ConnectionId;

use crate::connection::ClientConnection;
use crate::handlers::{handle_disconnect, handle_frame};
use crate::server::AppState;

/// Outbound frames buffered per connection before sends start dropping.
const OUTBOUND_BUFFER: usize = 1024;

/// `GET /ws` upgrade handler.
pub async fn ws_handler(State(app): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_message_size(app.config.max_message_size)
        .on_upgrade(move |socket| run_session(app, socket))
}

/// Drive one client session from upgrade to teardown.
pub async fn run_session(app: AppState, socket: WebSocket) {
    let conn_id = ConnectionId::generate();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), outbound_tx));

    counter!("connections_total").increment(1);
    gauge!("connections_open").increment(1.0);
    info!(%conn_id, "connection opened");

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, outbound_rx, connection.close_token()));

    let close_token = connection.close_token();
    let shutdown = app.shutdown.clone();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!(%conn_id, "closing session for shutdown");
                break;
            }
            () = close_token.cancelled() => break,
            msg = ws_rx.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        counter!("frames_received_total").increment(1);
                        handle_frame(&app.shared, &connection, text.as_str()).await;
                        if !connection.is_open() {
                            break;
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        debug!(%conn_id, "ignoring binary frame");
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(err) => {
                        debug!(%conn_id, %err, "socket error");
                        break;
                    }
                }
            }
        }
    }

    connection.mark_closed();
    handle_disconnect(&app.shared, &conn_id).await;
    connection.force_close();
    let _ = writer.await;

    gauge!("connections_open").decrement(1.0);
    info!(
        %conn_id,
        dropped_frames = connection.drop_count(),
        "connection closed"
    );
}

/// Forward outbound frames to the socket until the channel or session ends.
async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Arc<String>>,
    close: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            // Frames queued before a force-close still go out first.
            biased;
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                    break;
                }
                counter!("frames_sent_total").increment(1);
            }
            () = close.cancelled() => {
                while let Ok(frame) = outbound_rx.try_recv() {
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        return;
                    }
                    counter!("frames_sent_total").increment(1);
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
