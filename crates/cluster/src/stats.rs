use std::sync::Mutex;

use sysinfo::{Pid, System};

/// One sample of host/process load.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStats {
    pub cpu_load: f64,
    pub load_average: [f64; 3],
    pub uptime_ms: u64,
}

/// Source of the load figures published on each heartbeat.
pub trait StatsProvider: Send + Sync {
    fn sample(&self) -> NodeStats;
}

/// Stats of the current process from the operating system.
pub struct SystemStats {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemStats {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProvider for SystemStats {
    fn sample(&self) -> NodeStats {
        let mut system = self.system.lock().expect("system stats lock poisoned");
        let (cpu_load, uptime_ms) = match self.pid {
            Some(pid) => {
                system.refresh_process(pid);
                system
                    .process(pid)
                    .map(|p| (f64::from(p.cpu_usage()) / 100.0, p.run_time() * 1000))
                    .unwrap_or((f64::NAN, 0))
            }
            None => (f64::NAN, 0),
        };
        let load = System::load_average();
        NodeStats {
            cpu_load,
            load_average: [load.one, load.five, load.fifteen],
            uptime_ms,
        }
    }
}
