//! cdp-node: joins the cluster and runs node maintenance.
//!
//! Registers this node, keeps its heartbeat fresh, evicts stale peers and,
//! on the coordinator, purges daily partitions past the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use futures::future::BoxFuture;
use tracing::{info, warn};

use cdp_cluster::{ClusterRegistry, Scheduler, SystemStats, TaskFn, TokioScheduler};
use cdp_core::config::{self, Config};
use cdp_persistence::{OpenSearchBackend, PersistenceService};

// ── CLI ─────────────────────────────────────────────────────────────

/// Cluster node for the condition-driven persistence engine.
#[derive(Parser, Debug)]
#[command(name = "cdp-node", version, about)]
struct Cli {
    /// Configuration profile (e.g. PROD); keys are read as {PROFILE}_{KEY}.
    /// Defaults to CDP_PROFILE.
    #[arg(long)]
    profile: Option<String>,

    /// Overrides CLUSTER_NODE_ID from the profile.
    #[arg(long)]
    node_id: Option<String>,

    /// Seconds between retention purge runs.
    #[arg(long, env = "PURGE_INTERVAL_SECS", default_value_t = 86_400)]
    purge_interval: u64,
}

fn purge_task(registry: Arc<ClusterRegistry>, persistence: Arc<PersistenceService>, retention_days: u32) -> TaskFn {
    let registry = Arc::downgrade(&registry);
    Arc::new(move || -> BoxFuture<'static, ()> {
        let registry = registry.clone();
        let persistence = persistence.clone();
        Box::pin(async move {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            match registry.is_coordinator().await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!(error = %e, "could not determine coordinator, skipping purge");
                    return;
                }
            }
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
            match persistence.purge_before(cutoff).await {
                Ok(purged) => info!(count = purged.len(), cutoff = %cutoff, "retention purge complete"),
                Err(e) => warn!(error = %e, "retention purge failed"),
            }
        })
    })
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let cli = Cli::parse();

    let mut config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(node_id) = cli.node_id {
        config.cluster.node_id = node_id;
    }
    config.log_summary();

    let backend = Arc::new(OpenSearchBackend::new(&config.search)?);
    let persistence = Arc::new(PersistenceService::from_config(&config, backend)?);
    let registry = ClusterRegistry::init(
        &config.cluster,
        persistence.clone(),
        Arc::new(SystemStats::new()),
    )
    .await?;

    let scheduler = TokioScheduler;
    registry.attach_scheduler(&scheduler);

    let retention_days = config.persistence.event_retention_days;
    let purge = if retention_days > 0 {
        info!(retention_days, interval_secs = cli.purge_interval, "retention purge enabled");
        Some(scheduler.create_recurring_task(
            "eventRetentionPurge",
            Duration::from_secs(cli.purge_interval),
            purge_task(registry.clone(), persistence.clone(), retention_days),
            false,
        ))
    } else {
        None
    };

    info!(node_id = %registry.node_id(), "cdp-node running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    if let Some(handle) = purge {
        handle.cancel();
    }
    registry.destroy().await?;
    info!("cdp-node exited cleanly");

    Ok(())
}
