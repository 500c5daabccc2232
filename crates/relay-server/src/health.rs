//! `GET /health` endpoint.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

/// Health snapshot returned to probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when the server is answering.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered sessions right now.
    pub connections: usize,
    /// Groups with at least one member.
    pub groups: usize,
}

/// Report process liveness plus a shallow state snapshot.
pub async fn health_handler(State(app): State<AppState>) -> Json<HealthResponse> {
    let state = app.shared.read().await;
    Json(HealthResponse {
        status: "ok".to_owned(),
        uptime_secs: app.started_at.elapsed().as_secs(),
        connections: state.registry.len(),
        groups: state.groups.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let response = HealthResponse {
            status: "ok".to_owned(),
            uptime_secs: 42,
            connections: 3,
            groups: 1,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptime_secs"], 42);
        assert_eq!(json["connections"], 3);
        assert_eq!(json["groups"], 1);
    }
}
