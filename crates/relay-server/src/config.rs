//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use relay_core::constants::{STALE_AFTER_SECS, SWEEP_INTERVAL_SECS};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between presence sweeps, in seconds.
    pub sweep_interval_secs: u64,
    /// A session with no heartbeat for this many seconds is stale.
    pub stale_after_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for tasks to drain, in seconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
    /// Where the message log is appended. `None` disables it.
    pub message_log_path: Option<PathBuf>,
}

fn default_drain_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            stale_after_secs: STALE_AFTER_SECS,
            max_message_size: 1024 * 1024, // 1 MB
            drain_timeout_secs: default_drain_timeout(),
            message_log_path: Some(PathBuf::from("message_log.txt")),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
