use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use cdp_core::config::ClusterConfig;
use cdp_core::{CdpError, Result};
use cdp_persistence::PersistenceService;
use tracing::{debug, info, warn};

use crate::node::ClusterNode;
use crate::scheduler::{Scheduler, TaskFn, TaskHandle};
use crate::stats::StatsProvider;

pub const HEARTBEAT_TASK: &str = "clusterNodeHeartbeat";
pub const CLEANUP_TASK: &str = "clusterStaleNodeCleanup";

const CLEANUP_PERIOD: Duration = Duration::from_secs(60);
/// A node is stale once its last heartbeat is this many periods old.
const STALE_AFTER_PERIODS: u32 = 3;
const MAX_NODES: usize = 1000;

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// This node's view of cluster membership, stored through the persistence
/// facade as `clusterNode` items.
pub struct ClusterRegistry {
    persistence: Arc<PersistenceService>,
    stats: Arc<dyn StatsProvider>,
    node_id: String,
    public_address: String,
    internal_address: String,
    heartbeat_period: Duration,
    started_at: DateTime<Utc>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl ClusterRegistry {
    /// Register this node. Fails on a blank node id.
    pub async fn init(
        config: &ClusterConfig,
        persistence: Arc<PersistenceService>,
        stats: Arc<dyn StatsProvider>,
    ) -> Result<Arc<Self>> {
        let node_id = config.node_id.trim();
        if node_id.is_empty() {
            return Err(CdpError::InvalidNodeConfiguration(
                "CLUSTER_NODE_ID must be set to a non-blank value".to_string(),
            ));
        }
        if config.heartbeat_ms == 0 {
            return Err(CdpError::InvalidNodeConfiguration(
                "heartbeat period must be positive".to_string(),
            ));
        }

        let registry = Arc::new(Self {
            persistence,
            stats,
            node_id: node_id.to_string(),
            public_address: config.public_address.clone(),
            internal_address: config.internal_address.clone(),
            heartbeat_period: Duration::from_millis(config.heartbeat_ms),
            started_at: Utc::now(),
            tasks: Mutex::new(Vec::new()),
        });
        registry.heartbeat().await?;
        info!(
            node_id = %registry.node_id,
            public_address = %registry.public_address,
            heartbeat_ms = config.heartbeat_ms,
            "cluster node registered"
        );
        Ok(registry)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period
    }

    /// Epoch millis before which a heartbeat counts as stale. `None` when
    /// the window reaches past the representable range, so nothing is stale.
    fn stale_threshold(&self, now: DateTime<Utc>) -> Option<i64> {
        let window = self.heartbeat_period.checked_mul(STALE_AFTER_PERIODS)?;
        let window = chrono::Duration::from_std(window).ok()?;
        now.checked_sub_signed(window).map(|t| t.timestamp_millis())
    }

    pub async fn heartbeat(&self) -> Result<ClusterNode> {
        self.heartbeat_at(Utc::now()).await
    }

    /// Refresh this node's record with fresh stats, stamped `now`.
    pub async fn heartbeat_at(&self, now: DateTime<Utc>) -> Result<ClusterNode> {
        let stats = self.stats.sample();
        let mut node = ClusterNode {
            item_id: self.node_id.clone(),
            public_host_address: self.public_address.clone(),
            internal_host_address: self.internal_address.clone(),
            cpu_load: finite_or_zero(stats.cpu_load),
            load_average: stats.load_average.map(finite_or_zero),
            uptime: stats.uptime_ms,
            last_heartbeat: now.timestamp_millis(),
            start_time: self.started_at.timestamp_millis(),
        };
        self.persistence.save(&mut node).await?;
        debug!(node_id = %self.node_id, cpu_load = node.cpu_load, "heartbeat");
        Ok(node)
    }

    /// All registered nodes, ordered by id.
    pub async fn get_cluster_nodes(&self) -> Result<Vec<ClusterNode>> {
        Ok(self
            .persistence
            .query::<ClusterNode>(None, Some("itemId"), 0, MAX_NODES)
            .await?
            .list)
    }

    pub async fn evict_stale_nodes(&self) -> Result<Vec<String>> {
        self.evict_stale_nodes_at(Utc::now()).await
    }

    /// Remove peers whose last heartbeat is older than three heartbeat
    /// periods before `now`. This node is never evicted by itself.
    pub async fn evict_stale_nodes_at(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let Some(threshold) = self.stale_threshold(now) else {
            return Ok(Vec::new());
        };
        let mut evicted = Vec::new();
        for node in self.get_cluster_nodes().await? {
            if node.item_id == self.node_id || node.last_heartbeat >= threshold {
                continue;
            }
            if self.persistence.remove::<ClusterNode>(&node.item_id).await? {
                info!(
                    node_id = %node.item_id,
                    last_heartbeat = node.last_heartbeat,
                    "evicted stale cluster node"
                );
                evicted.push(node.item_id);
            }
        }
        Ok(evicted)
    }

    pub async fn is_coordinator(&self) -> Result<bool> {
        self.is_coordinator_at(Utc::now()).await
    }

    /// True when this node has the smallest id among live nodes.
    pub async fn is_coordinator_at(&self, now: DateTime<Utc>) -> Result<bool> {
        let threshold = self.stale_threshold(now).unwrap_or(i64::MIN);
        let smallest_live = self
            .get_cluster_nodes()
            .await?
            .into_iter()
            .filter(|n| n.item_id == self.node_id || n.last_heartbeat >= threshold)
            .map(|n| n.item_id)
            .min();
        Ok(smallest_live.map_or(true, |id| id == self.node_id))
    }

    /// Schedule the heartbeat and stale-node cleanup tasks, cancelling any
    /// tasks from an earlier attach. The tasks hold a weak reference and
    /// become no-ops once the registry is dropped.
    pub fn attach_scheduler(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        let heartbeat = Self::task(Arc::downgrade(self), Self::heartbeat_job);
        let cleanup = Self::task(Arc::downgrade(self), Self::cleanup_job);

        let mut tasks = self.tasks.lock().expect("cluster task lock poisoned");
        for previous in tasks.drain(..) {
            previous.cancel();
        }
        tasks.push(scheduler.create_recurring_task(HEARTBEAT_TASK, self.heartbeat_period, heartbeat, true));
        tasks.push(scheduler.create_recurring_task(CLEANUP_TASK, CLEANUP_PERIOD, cleanup, false));
        info!(node_id = %self.node_id, "cluster tasks scheduled");
    }

    fn heartbeat_job(registry: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = registry.heartbeat().await {
                warn!(node_id = %registry.node_id, error = %e, "heartbeat failed");
            }
        })
    }

    fn cleanup_job(registry: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = registry.evict_stale_nodes().await {
                warn!(node_id = %registry.node_id, error = %e, "stale node cleanup failed");
            }
        })
    }

    fn task(registry: Weak<Self>, body: fn(Arc<Self>) -> BoxFuture<'static, ()>) -> TaskFn {
        Arc::new(move || -> BoxFuture<'static, ()> {
            match registry.upgrade() {
                Some(registry) => body(registry),
                None => Box::pin(async {}),
            }
        })
    }

    /// Cancel every task created by [`attach_scheduler`](Self::attach_scheduler).
    pub fn detach_scheduler(&self) {
        let handles: Vec<TaskHandle> = self
            .tasks
            .lock()
            .expect("cluster task lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            handle.cancel();
        }
    }

    /// Stop background tasks and deregister this node.
    pub async fn destroy(&self) -> Result<()> {
        self.detach_scheduler();
        self.persistence.remove::<ClusterNode>(&self.node_id).await?;
        info!(node_id = %self.node_id, "cluster node deregistered");
        Ok(())
    }
}
