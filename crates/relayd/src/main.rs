//! # relayd
//!
//! Relay server binary — resolves configuration from CLI flags and
//! environment, starts the message log and the WebSocket server, and runs
//! until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use relay_logging::MessageLog;
use relay_server::{RelayServer, ServerConfig};

/// Default listen port when neither `--port` nor `RELAY_PORT` is set.
const DEFAULT_PORT: u16 = 8080;

/// Presence and messaging relay server.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "WebSocket presence and messaging relay")]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Append the human-readable message log to this file.
    #[arg(long)]
    message_log: Option<PathBuf>,

    /// Disable the message log file entirely.
    #[arg(long)]
    no_message_log: bool,
}

/// Read an environment override, ignoring values that fail to parse.
fn env_override<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse_override(&raw);
    if parsed.is_none() {
        warn!(var = name, value = %raw, "ignoring unparseable environment override");
    }
    parsed
}

fn parse_override<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

/// Timing overrides must be positive; a zero interval or window would stall
/// the presence supervisor.
fn positive_env_override(name: &str) -> Option<u64> {
    reject_zero(name, env_override(name)?)
}

fn reject_zero(name: &str, value: u64) -> Option<u64> {
    if value == 0 {
        warn!(var = name, "ignoring zero environment override");
        return None;
    }
    Some(value)
}

/// Build the server config: defaults, then environment, then CLI flags.
fn resolve_config(cli: &Cli) -> ServerConfig {
    let mut config = ServerConfig {
        port: DEFAULT_PORT,
        ..ServerConfig::default()
    };

    if let Some(host) = env_override::<String>("RELAY_HOST") {
        config.host = host;
    }
    if let Some(port) = env_override::<u16>("RELAY_PORT") {
        config.port = port;
    }
    if let Some(secs) = positive_env_override("RELAY_SWEEP_INTERVAL") {
        config.sweep_interval_secs = secs;
    }
    if let Some(secs) = positive_env_override("RELAY_STALE_TIMEOUT") {
        config.stale_after_secs = secs;
    }

    if let Some(host) = &cli.host {
        config.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(path) = &cli.message_log {
        config.message_log_path = Some(path.clone());
    }
    if cli.no_message_log {
        config.message_log_path = None;
    }

    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = resolve_config(&args);

    let (log, log_writer) = match &config.message_log_path {
        Some(path) => {
            info!(path = %path.display(), "message log enabled");
            let (log, writer) = MessageLog::spawn(path.clone());
            (log, Some(writer))
        }
        None => {
            info!("message log disabled");
            (MessageLog::disabled(), None)
        }
    };

    let server = RelayServer::new(config, log);
    let shutdown = server.shutdown();

    let signal_shutdown = shutdown.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_shutdown.trigger();
        }
    });

    server.listen().await.context("server failed")?;

    // Dropping the server releases the last log sender so the writer can
    // flush and exit.
    drop(server);
    if let Some(writer) = log_writer {
        if tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .is_err()
        {
            warn!("message log writer did not flush in time");
        }
    }

    info!("shutdown complete");
    Ok(())
}
