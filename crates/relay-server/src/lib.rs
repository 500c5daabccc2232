//! # relay-server
//!
//! The relay itself: an Axum HTTP + WebSocket server where clients register
//! a unique display name, join named groups, and exchange group and direct
//! messages gated by a mutual-friendship graph.
//!
//! Module map:
//!
//! - [`config`]: `ServerConfig` with bind and timing knobs
//! - [`connection`]: per-socket `ClientConnection` handle
//! - [`state`]: owned relay state — session registry, group directory,
//!   friend graph — behind one `RwLock` so handlers run atomically
//! - [`delivery`]: fan-out primitives and the private-message retry chain
//! - [`handlers`]: inbound event dispatch and every operation's semantics
//! - [`presence`]: periodic liveness sweep over all sessions
//! - [`websocket`]: socket upgrade and per-session pump loops
//! - [`server`], [`health`], [`shutdown`]: router, health snapshot,
//!   graceful-shutdown coordination

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod delivery;
pub mod handlers;
pub mod health;
pub mod presence;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
pub use state::{RelayState, SharedState};
