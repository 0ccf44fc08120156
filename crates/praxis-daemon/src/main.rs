//! Praxis realtime daemon.
//!
//! Wires the production stack together: settings, the session store, the
//! WebSocket connection lifecycle, the notification poller, and the
//! push-to-cache bridge. Runs until SIGINT/SIGTERM, then tears the
//! connection down before exiting.

#![deny(unsafe_code)]

mod bridge;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use praxis_core::{Session, SessionStore};
use praxis_notify::{NotificationPoller, PollIntervals, RestNotificationApi};
use praxis_realtime::{
    ConnectionRegistry, ConnectionView, LifecycleController, RealtimeConfig, WsTransport,
};
use praxis_settings::{PraxisSettings, load_settings, load_settings_from_path};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Env var carrying the access token when `--token` is not given.
const ACCESS_TOKEN_VAR: &str = "PRAXIS_ACCESS_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "praxis-daemon", about = "Praxis realtime connection daemon", version)]
struct Cli {
    /// Settings file (default: ~/.praxis/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Realtime WebSocket endpoint (overrides settings).
    #[arg(long)]
    endpoint: Option<String>,

    /// Notification API base URL (overrides settings).
    #[arg(long)]
    api_base_url: Option<String>,

    /// Access token; falls back to $PRAXIS_ACCESS_TOKEN.
    #[arg(long)]
    token: Option<String>,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load(cli: &Cli) -> anyhow::Result<PraxisSettings> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => load_settings().context("loading settings")?,
    };
    if let Some(endpoint) = &cli.endpoint {
        settings.realtime.endpoint.clone_from(endpoint);
    }
    if let Some(base) = &cli.api_base_url {
        settings.notifications.api_base_url.clone_from(base);
    }
    Ok(settings)
}

fn resolve_token(cli: &Cli) -> anyhow::Result<String> {
    let token = cli
        .token
        .clone()
        .or_else(|| std::env::var(ACCESS_TOKEN_VAR).ok())
        .unwrap_or_default();
    if token.is_empty() {
        bail!("no access token: pass --token or set {ACCESS_TOKEN_VAR}");
    }
    Ok(token)
}

/// Log connection state transitions for operators.
async fn log_view_changes(
    mut view: watch::Receiver<ConnectionView>,
    stopping: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stopping.cancelled() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                info!(state = ?current.state, connected = current.connected, "connection state");
            }
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_tracing(&settings.logging.level);
    info!(
        endpoint = %settings.realtime.endpoint,
        api = %settings.notifications.api_base_url,
        "praxis daemon starting"
    );

    let token = resolve_token(&cli)?;
    let sessions = SessionStore::new();
    sessions.set(Some(Session::new(&token)));

    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(WsTransport::new()),
        RealtimeConfig::from_settings(&settings.realtime),
    ));
    let controller = LifecycleController::spawn(registry, sessions.subscribe());

    let api = RestNotificationApi::from_settings(&settings.notifications)
        .context("building notification client")?
        .with_token(&token);
    let poller = NotificationPoller::spawn(
        Arc::new(api),
        PollIntervals::from_settings(&settings.notifications),
    );

    let stopping = CancellationToken::new();
    let bridge_task = tokio::spawn(bridge::run(
        controller.view(),
        poller.cache(),
        stopping.clone(),
    ));
    let view_task = tokio::spawn(log_view_changes(controller.view(), stopping.clone()));

    wait_for_signal().await;
    info!("shutdown signal received");

    stopping.cancel();
    let _ = bridge_task.await;
    let _ = view_task.await;
    poller.shutdown().await;
    controller.shutdown().await;
    sessions.set(None);
    info!("praxis daemon stopped");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
