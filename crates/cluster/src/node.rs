use cdp_core::Item;
use serde::{Deserialize, Serialize};

/// Membership record of one node, refreshed on every heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub public_host_address: String,
    #[serde(default)]
    pub internal_host_address: String,
    /// Process CPU usage, 0.0 when it could not be read.
    #[serde(default)]
    pub cpu_load: f64,
    /// 1, 5 and 15 minute load averages.
    #[serde(default)]
    pub load_average: [f64; 3],
    /// Milliseconds since the process started.
    #[serde(default)]
    pub uptime: u64,
    /// Epoch millis of the last heartbeat.
    #[serde(default)]
    pub last_heartbeat: i64,
    /// Epoch millis at which this node registered.
    #[serde(default)]
    pub start_time: i64,
}

impl Item for ClusterNode {
    const ITEM_TYPE: &'static str = "clusterNode";

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn set_item_id(&mut self, id: String) {
        self.item_id = id;
    }
}
