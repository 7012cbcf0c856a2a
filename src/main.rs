use anyhow::{Context, Result};
use axum_server::Handle;
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use liftclub::config::ServiceConfig;
use liftclub::logging;
use liftclub::managers::{
    create_shared_analytics, create_shared_lifecycle_manager, create_shared_query_engine,
    SharedLifecycleManager,
};
use liftclub::state::{
    create_shared_club_registry, create_shared_request_store, ClubRegistry,
    JsonFileSnapshotStore, RequestStore, SharedClubRegistry, SharedRequestStore,
    SharedSnapshotStore, Snapshot,
};
use liftclub::web::{build_router, start_web_server, AdminState, AppState};

/// Lift club coordination service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (environment variables override it)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// HTTP port to listen on
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Directory holding the state snapshot
    #[arg(long)]
    state_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(state_path) = args.state_path {
        config.state_path = state_path;
    }
    config.validate()?;

    // Create log buffer for the admin routes
    let log_buffer = logging::create_log_buffer(config.log_buffer_size);
    logging::init_tracing(config.level_filter(), log_buffer.clone());

    // Load state
    let snapshot_store: SharedSnapshotStore =
        Arc::new(JsonFileSnapshotStore::new(config.snapshot_file()));
    let (registry, requests) = match snapshot_store
        .load()
        .await
        .context("Could not load state snapshot")?
    {
        Some(snapshot) => snapshot.into_stores()?,
        None => {
            info!(
                "No snapshot at {}, starting empty",
                config.snapshot_file().display()
            );
            (ClubRegistry::new(), RequestStore::new())
        }
    };
    let registry = create_shared_club_registry(registry);
    let requests = create_shared_request_store(requests);

    // Create managers
    let lifecycle = create_shared_lifecycle_manager(requests.clone(), registry.clone());
    let queries = create_shared_query_engine(registry.clone(), requests.clone());
    let analytics = create_shared_analytics(registry.clone(), lifecycle.clone());

    info!(
        "Loaded {} clubs and {} requests",
        registry.club_count(),
        requests.len()
    );

    spawn_lifecycle_logger(lifecycle.clone());
    spawn_periodic_snapshots(
        snapshot_store.clone(),
        registry.clone(),
        requests.clone(),
        Duration::from_secs(config.snapshot_interval_secs),
    );

    let app = build_router(
        AppState {
            registry: registry.clone(),
            lifecycle: lifecycle.clone(),
            queries: queries.clone(),
        },
        AdminState {
            registry: registry.clone(),
            lifecycle,
            queries,
            analytics,
            log_buffer,
            admin_token: config.admin_token.clone(),
        },
    );

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutting down...");
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    let served = start_web_server(&config, app, handle).await;

    // Final save runs even if the server failed
    save_snapshot(&snapshot_store, &registry, &requests).await;

    served
}

async fn save_snapshot(
    store: &SharedSnapshotStore,
    registry: &SharedClubRegistry,
    requests: &SharedRequestStore,
) {
    let snapshot = Snapshot::capture(registry, requests);
    if let Err(e) = store.save(&snapshot).await {
        if e.is_retryable() {
            warn!("Failed to save snapshot, will retry: {}", e);
        } else {
            error!("Failed to save snapshot: {}", e);
        }
    }
}

fn spawn_periodic_snapshots(
    store: SharedSnapshotStore,
    registry: SharedClubRegistry,
    requests: SharedRequestStore,
    every: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            save_snapshot(&store, &registry, &requests).await;
        }
    });
}

/// Forward committed lifecycle changes; the place to hang rider notifications
fn spawn_lifecycle_logger(lifecycle: SharedLifecycleManager) {
    let mut rx = lifecycle.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event = %json, "Lifecycle event"),
                    Err(e) => warn!("Could not serialize lifecycle event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Lifecycle listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
