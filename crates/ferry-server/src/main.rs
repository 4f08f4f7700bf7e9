use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ferry_core::journal::EventJournal;
use ferry_core::{
    replay_journal, spawn_sweeper, DisabledJournal, EventBus, FerryConfig, FileJournal,
    HttpReplicator, StaticFollowerRegistry, StaticLeadership,
};
use ferry_server::app::{build_router, AppState};
use tracing::{info, warn};

fn load_config() -> FerryConfig {
    let paths = ["ferry.toml", "/etc/ferry/ferry.toml"];

    for path in &paths {
        if Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => {
                        info!(path, "loaded configuration");
                        return config;
                    }
                    Err(e) => {
                        eprintln!("error parsing {path}: {e}");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("error reading {path}: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    info!("no config file found, using defaults");
    FerryConfig::default()
}

fn apply_env_overrides(config: &mut FerryConfig) {
    if let Ok(dir) = std::env::var("FERRY_DATA_DIR") {
        config.journal.data_dir = dir;
    }
    if let Ok(addr) = std::env::var("FERRY_LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ferry_core::telemetry::init_tracing();

    let mut config = load_config();
    apply_env_overrides(&mut config);

    let journal: Arc<dyn EventJournal> = if config.journal.enabled {
        Arc::new(FileJournal::open(
            &config.journal.data_dir,
            config.journal.max_file_size,
        )?)
    } else {
        info!("journal disabled, state will not survive a restart");
        Arc::new(DisabledJournal)
    };

    let registry = Arc::new(StaticFollowerRegistry::from_config(
        &config.cluster.followers,
    ));
    let replicator = HttpReplicator::new(
        config.cluster.node_id.clone(),
        registry,
        Duration::from_millis(config.cluster.replication_timeout_ms),
    )?;
    let leadership = Arc::new(StaticLeadership::new(config.cluster.leader));

    let bus = Arc::new(
        EventBus::new(config.events)
            .with_journal(journal)
            .with_replicator(Arc::new(replicator))
            .with_leadership(leadership),
    );

    // state must be rebuilt before the first request or sweep sees it
    let report = replay_journal(&bus).await?;
    info!(
        applied = report.applied,
        skipped = report.skipped,
        "restored state from journal"
    );

    let state = AppState::new(Arc::clone(&bus), config.cluster.node_id.clone());
    let shutdown = state.shutdown.clone();
    let sweeper = spawn_sweeper(
        Arc::clone(&bus),
        Duration::from_secs(config.sweeper.interval_secs.max(1)),
        shutdown.child_token(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        node_id = %config.cluster.node_id,
        leader = config.cluster.leader,
        followers = config.cluster.followers.len(),
        "starting HTTP server"
    );

    let on_signal = shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            on_signal.cancel();
        })
        .await?;

    info!("HTTP server stopped, waiting for sweeper");
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "sweeper task ended abnormally");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                if let Err(e) = ctrl_c.await {
                    warn!(error = %e, "failed to listen for CTRL+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            warn!(error = %e, "failed to listen for CTRL+C");
        }
    }

    info!("received shutdown signal");
}
