//! HTTP server assembly: routes, shared state, and the accept loop.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::{any, get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use relay_logging::MessageLog;

use crate::config::ServerConfig;
use crate::health::health_handler;
use crate::presence::run_presence_supervisor;
use crate::shutdown::ShutdownCoordinator;
use crate::state::{RelayState, SharedState};
use crate::websocket::ws_handler;

/// Shared handles cloned into every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The relay's owned state behind its lock.
    pub shared: SharedState,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Cancelled when the server is shutting down.
    pub shutdown: CancellationToken,
    /// When the server came up, for the health endpoint.
    pub started_at: Instant,
}

/// The relay server: state, routes, and lifecycle.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    shared: SharedState,
    shutdown: Arc<ShutdownCoordinator>,
    started_at: Instant,
}

impl RelayServer {
    /// Build a server around fresh state and the given message log.
    #[must_use]
    pub fn new(config: ServerConfig, log: MessageLog) -> Self {
        Self {
            config: Arc::new(config),
            shared: RelayState::shared(log),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            started_at: Instant::now(),
        }
    }

    /// Handle to the relay state, mainly for tests and the health endpoint.
    #[must_use]
    pub fn shared(&self) -> SharedState {
        self.shared.clone()
    }

    /// The shutdown coordinator driving this server's tasks.
    #[must_use]
    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    fn app_state(&self) -> AppState {
        AppState {
            shared: self.shared.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.token(),
            started_at: self.started_at,
        }
    }

    /// Assemble the router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", any(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.app_state())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn listen(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    ///
    /// Spawns the presence supervisor alongside the accept loop and drains
    /// it once the listener stops.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "relay listening");

        let supervisor = tokio::spawn(run_presence_supervisor(
            self.shared.clone(),
            Duration::from_secs(self.config.sweep_interval_secs),
            Duration::from_secs(self.config.stale_after_secs),
            self.shutdown.token(),
        ));

        let token = self.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await?;

        let drain_timeout = Duration::from_secs(self.config.drain_timeout_secs);
        self.shutdown.drain(vec![supervisor], Some(drain_timeout)).await;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
