use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdp_cluster::{ClusterRegistry, NodeStats, Scheduler, StatsProvider, TaskFn, TaskHandle};
use cdp_core::config::ClusterConfig;
use cdp_core::Config;
use cdp_persistence::{MemoryBackend, PersistenceService};

/// Stats that never change between samples.
pub struct FixedStats(pub NodeStats);

impl StatsProvider for FixedStats {
    fn sample(&self) -> NodeStats {
        self.0
    }
}

pub fn fixed_stats() -> Arc<dyn StatsProvider> {
    Arc::new(FixedStats(NodeStats {
        cpu_load: 0.25,
        load_average: [1.0, 0.5, f64::NAN],
        uptime_ms: 60_000,
    }))
}

pub struct RecordedTask {
    pub name: String,
    pub period: Duration,
    pub run_immediately: bool,
    pub task: TaskFn,
    pub cancelled: Arc<AtomicBool>,
}

/// Records tasks instead of running them; tests drive them by hand.
#[derive(Default)]
pub struct RecordingScheduler {
    pub tasks: Mutex<Vec<RecordedTask>>,
}

impl RecordingScheduler {
    pub fn task(&self, name: &str) -> TaskFn {
        let tasks = self.tasks.lock().unwrap();
        tasks.iter().find(|t| t.name == name).unwrap().task.clone()
    }

    pub fn is_cancelled(&self, name: &str) -> bool {
        let tasks = self.tasks.lock().unwrap();
        tasks.iter().find(|t| t.name == name).unwrap().cancelled.load(Ordering::SeqCst)
    }
}

impl Scheduler for RecordingScheduler {
    fn create_recurring_task(&self, name: &str, period: Duration, task: TaskFn, run_immediately: bool) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.tasks.lock().unwrap().push(RecordedTask {
            name: name.to_string(),
            period,
            run_immediately,
            task,
            cancelled: cancelled.clone(),
        });
        TaskHandle::new(name, move || cancelled.store(true, Ordering::SeqCst))
    }
}

pub fn persistence() -> Arc<PersistenceService> {
    let backend = Arc::new(MemoryBackend::new());
    Arc::new(PersistenceService::from_config(&Config::default(), backend).unwrap())
}

pub fn cluster_config(node_id: &str) -> ClusterConfig {
    ClusterConfig {
        node_id: node_id.to_string(),
        heartbeat_ms: 10_000,
        ..ClusterConfig::default()
    }
}

pub async fn node(id: &str, persistence: &Arc<PersistenceService>) -> Arc<ClusterRegistry> {
    ClusterRegistry::init(&cluster_config(id), persistence.clone(), fixed_stats())
        .await
        .unwrap()
}
