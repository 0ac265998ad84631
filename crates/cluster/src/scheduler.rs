//! Recurring background tasks supplied by the host.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Body of a recurring task; called once per period.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle to a scheduled task. Dropping it leaves the task running;
/// [`cancel`](TaskHandle::cancel) stops it.
pub struct TaskHandle {
    name: String,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!(task = %self.name, "cancelling recurring task");
            cancel();
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("name", &self.name).finish()
    }
}

pub trait Scheduler: Send + Sync {
    fn create_recurring_task(&self, name: &str, period: Duration, task: TaskFn, run_immediately: bool) -> TaskHandle;
}

/// Runs each task on its own tokio task. Must be used from within a tokio
/// runtime. A run that overruns its period delays the next one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn create_recurring_task(&self, name: &str, period: Duration, task: TaskFn, run_immediately: bool) -> TaskHandle {
        let task_name = name.to_string();
        let start = if run_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let join = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!(task = %task_name, "running recurring task");
                (task)().await;
            }
        });
        let abort = join.abort_handle();
        TaskHandle::new(name, move || abort.abort())
    }
}
