//! Server entry point: wire the store, feed, registry, and HTTP surface
//! together, then run until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use plank_relay::{ChangeFeed, FeedConfig, SessionRegistry};
use plank_server::{metrics, router, AppState};
use plank_store::{ConnectionConfig, ObjectStore};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "plank", about = "Kanban board change-notification server", version)]
struct Args {
    /// SQLite database file. Uses an in-memory database when omitted.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listen address.
    #[arg(long, default_value = "127.0.0.1:7177")]
    bind: SocketAddr,

    /// Change log poll interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Per-session delivery queue capacity.
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,

    /// Events retained for WebSocket resume.
    #[arg(long, default_value_t = 1024)]
    replay_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    plank_core::logging::init("info,plank=debug");

    let prometheus = metrics::install_recorder().context("installing metrics recorder")?;

    let store = Arc::new(match &args.db {
        Some(path) => ObjectStore::open(path, &ConnectionConfig::default())
            .with_context(|| format!("opening database {}", path.display()))?,
        None => ObjectStore::in_memory().context("opening in-memory database")?,
    });

    let registry = Arc::new(SessionRegistry::new(args.queue_capacity));
    let feed = ChangeFeed::start(
        store.clone(),
        registry.clone(),
        FeedConfig {
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            replay_capacity: args.replay_capacity,
            ..FeedConfig::default()
        },
    )
    .context("starting change feed")?;

    let state = AppState {
        store,
        registry: registry.clone(),
        replay: feed.replay(),
        prometheus,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!(addr = %args.bind, db = ?args.db, "plank listening");

    // Sessions must close as soon as the signal fires: the streaming
    // transports hold their connections open until their queues close, and
    // serve waits for those connections before returning.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("serving")?;

    feed.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, closing sessions");
    registry.shutdown();
}
