//! Cluster membership: each node records itself as a `clusterNode` item,
//! refreshes it on a heartbeat and evicts peers that stopped doing so.

pub mod node;
pub mod registry;
pub mod scheduler;
pub mod stats;

pub use node::ClusterNode;
pub use registry::ClusterRegistry;
pub use scheduler::{Scheduler, TaskFn, TaskHandle, TokioScheduler};
pub use stats::{NodeStats, StatsProvider, SystemStats};
