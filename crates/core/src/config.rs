use std::collections::{BTreeSet, HashMap};
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `type:field,type:field` pairs. Malformed entries are skipped.
pub fn parse_routing(raw: &str) -> HashMap<String, String> {
    split_list(raw)
        .into_iter()
        .filter_map(|pair| {
            let (item_type, field) = pair.split_once(':')?;
            let (item_type, field) = (item_type.trim(), field.trim());
            if item_type.is_empty() || field.is_empty() {
                tracing::warn!(entry = %pair, "ignoring malformed routing entry");
                return None;
            }
            Some((item_type.to_string(), field.to_string()))
        })
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub search: SearchConfig,
    pub persistence: PersistenceConfig,
    pub cluster: ClusterConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CDP_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CDP_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            search: SearchConfig::from_env_profiled(p),
            persistence: PersistenceConfig::from_env_profiled(p),
            cluster: ClusterConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  search:      cluster={}, addresses={}, auth={}",
            self.search.cluster_name,
            self.search.addresses.join(","),
            self.search.username.is_some()
        );
        tracing::info!(
            "  persistence: prefix={}, daily={:?}, routing={:?}",
            self.persistence.index_prefix,
            self.persistence.daily_item_types,
            self.persistence.routing_by_type
        );
        tracing::info!(
            "  cluster:     node={}, heartbeat={}ms",
            if self.cluster.node_id.is_empty() { "(unset)" } else { &self.cluster.node_id },
            self.cluster.heartbeat_ms
        );
    }
}

// ── Search backend ────────────────────────────────────────────

/// When indexed documents become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    #[default]
    False,
    WaitFor,
    True,
}

impl RefreshPolicy {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "immediate" => RefreshPolicy::True,
            "wait_for" | "waitfor" => RefreshPolicy::WaitFor,
            _ => RefreshPolicy::False,
        }
    }

    /// Value of the `refresh` URL parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            RefreshPolicy::False => "false",
            RefreshPolicy::WaitFor => "wait_for",
            RefreshPolicy::True => "true",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub cluster_name: String,
    /// `host:port` entries; requests rotate across them.
    pub addresses: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
    pub request_timeout_ms: u64,
    pub refresh_policy: RefreshPolicy,
    pub aggregate_bucket_size: u32,
}

impl SearchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cluster_name: profiled_env_or(p, "SEARCH_CLUSTER_NAME", "contextElasticSearch"),
            addresses: split_list(&profiled_env_or(p, "SEARCH_ADDRESSES", "localhost:9200")),
            username: profiled_env_opt(p, "SEARCH_USERNAME"),
            password: profiled_env_opt(p, "SEARCH_PASSWORD"),
            use_ssl: profiled_env_or(p, "SEARCH_USE_SSL", "false") == "true",
            request_timeout_ms: profiled_env_u64(p, "SEARCH_REQUEST_TIMEOUT_MS", 30_000),
            refresh_policy: RefreshPolicy::parse(&profiled_env_or(p, "SEARCH_REFRESH_POLICY", "false")),
            aggregate_bucket_size: profiled_env_u32(p, "SEARCH_AGGREGATE_BUCKET_SIZE", 5000),
        }
    }

    pub fn base_urls(&self) -> Vec<String> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        self.addresses
            .iter()
            .map(|a| format!("{}://{}", scheme, a))
            .collect()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cluster_name: "contextElasticSearch".to_string(),
            addresses: vec!["localhost:9200".to_string()],
            username: None,
            password: None,
            use_ssl: false,
            request_timeout_ms: 30_000,
            refresh_policy: RefreshPolicy::False,
            aggregate_bucket_size: 5000,
        }
    }
}

// ── Persistence layout ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Prefix of every physical index name.
    pub index_prefix: String,
    /// Item types stored in one partition per calendar day.
    pub daily_item_types: BTreeSet<String>,
    /// Item type → document field whose value is used as routing key.
    pub routing_by_type: HashMap<String, String>,
    /// Directory holding `<itemType>.json` mapping overrides.
    pub mappings_dir: Option<PathBuf>,
    /// Directory holding extra condition type definitions (YAML).
    pub condition_definitions_dir: Option<PathBuf>,
    /// Daily partitions older than this are purged. 0 disables purging.
    pub event_retention_days: u32,
}

impl PersistenceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            index_prefix: profiled_env_or(p, "SEARCH_INDEX_PREFIX", "context"),
            daily_item_types: split_list(&profiled_env_or(p, "DAILY_ITEM_TYPES", "event"))
                .into_iter()
                .collect(),
            routing_by_type: parse_routing(&profiled_env_or(p, "ROUTING_BY_TYPE", "")),
            mappings_dir: profiled_env_opt(p, "MAPPINGS_DIR").map(PathBuf::from),
            condition_definitions_dir: profiled_env_opt(p, "CONDITION_DEFINITIONS_DIR")
                .map(PathBuf::from),
            event_retention_days: profiled_env_u32(p, "EVENT_RETENTION_DAYS", 0),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            index_prefix: "context".to_string(),
            daily_item_types: ["event".to_string()].into_iter().collect(),
            routing_by_type: HashMap::new(),
            mappings_dir: None,
            condition_definitions_dir: None,
            event_retention_days: 0,
        }
    }
}

// ── Cluster ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Required; the registry refuses to start with a blank id.
    pub node_id: String,
    pub public_address: String,
    pub internal_address: String,
    pub heartbeat_ms: u64,
}

impl ClusterConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            node_id: profiled_env_or(p, "CLUSTER_NODE_ID", ""),
            public_address: profiled_env_or(p, "CLUSTER_PUBLIC_ADDRESS", "http://localhost:8181"),
            internal_address: profiled_env_or(p, "CLUSTER_INTERNAL_ADDRESS", "https://localhost:9443"),
            heartbeat_ms: profiled_env_u64(p, "CLUSTER_HEARTBEAT_MS", 10_000),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            public_address: "http://localhost:8181".to_string(),
            internal_address: "https://localhost:9443".to_string(),
            heartbeat_ms: 10_000,
        }
    }
}
