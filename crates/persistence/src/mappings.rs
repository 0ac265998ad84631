//! Index mappings per item type.
//!
//! Built-in types ship a default mapping; `<dir>/<itemType>.json` files
//! replace it. Unknown types get the common fields only.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cdp_core::{CdpError, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Fields every stored document carries.
fn common_properties() -> Map<String, Value> {
    let mut props = Map::new();
    for field in ["itemId", "itemType", "scope"] {
        props.insert(field.to_string(), json!({"type": "keyword"}));
    }
    props
}

/// Strings are exact-match keywords unless a mapping says otherwise.
fn dynamic_templates() -> Value {
    json!([{
        "all_strings": {
            "match_mapping_type": "string",
            "mapping": {"type": "keyword"}
        }
    }])
}

fn with_common(extra: Value) -> Value {
    let mut props = common_properties();
    if let Value::Object(extra) = extra {
        props.extend(extra);
    }
    json!({"dynamic_templates": dynamic_templates(), "properties": props})
}

/// Default mapping for a built-in item type.
pub fn default_mapping(item_type: &str) -> Value {
    match item_type {
        "profile" => with_common(json!({
            "segments": {"type": "keyword"},
            "mergedWith": {"type": "keyword"},
            "properties": {"properties": {
                "firstVisit": {"type": "date"},
                "lastVisit": {"type": "date"},
                "nbOfVisits": {"type": "long"}
            }},
            "systemProperties": {"type": "object"},
            "scores": {"type": "object"}
        })),
        "session" => with_common(json!({
            "profileId": {"type": "keyword"},
            "timeStamp": {"type": "date"},
            "lastEventDate": {"type": "date"},
            "size": {"type": "long"},
            "duration": {"type": "long"}
        })),
        "event" => with_common(json!({
            "eventType": {"type": "keyword"},
            "sessionId": {"type": "keyword"},
            "profileId": {"type": "keyword"},
            "timeStamp": {"type": "date"}
        })),
        "clusterNode" => with_common(json!({
            "publicHostAddress": {"type": "keyword"},
            "internalHostAddress": {"type": "keyword"},
            "cpuLoad": {"type": "double"},
            "loadAverage": {"type": "double"},
            "uptime": {"type": "long"},
            "lastHeartbeat": {"type": "long"}
        })),
        _ => with_common(Value::Null),
    }
}

/// Deep-merge `patch` into `base`; objects merge, anything else replaces.
pub fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(b), Value::Object(p)) => {
            for (k, v) in p {
                match b.get_mut(k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        b.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (slot, v) => *slot = v.clone(),
    }
}

/// The mapping in effect for each item type.
#[derive(Debug, Clone, Default)]
pub struct MappingSet {
    overrides: HashMap<String, Value>,
}

impl MappingSet {
    /// Load overrides from `dir` when given. Each `<itemType>.json` holds the
    /// full mapping for that type.
    pub fn new(dir: Option<&Path>) -> Result<Self> {
        let mut overrides = HashMap::new();
        let Some(dir) = dir else {
            return Ok(Self { overrides });
        };
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "mapping override directory not found");
            return Ok(Self { overrides });
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(item_type) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path)?;
            let mapping: Value = serde_json::from_str(&raw).map_err(|e| {
                CdpError::Definition(format!("invalid mapping file {}: {}", path.display(), e))
            })?;
            info!(item_type = %item_type, path = %path.display(), "loaded mapping override");
            overrides.insert(item_type.to_string(), mapping);
        }
        Ok(Self { overrides })
    }

    pub fn get(&self, item_type: &str) -> Value {
        self.overrides
            .get(item_type)
            .cloned()
            .unwrap_or_else(|| default_mapping(item_type))
    }

    /// Record additional fields for a type; later partitions are created with
    /// the merged mapping.
    pub fn merge(&mut self, item_type: &str, patch: &Value) -> Value {
        let mut current = self.get(item_type);
        merge(&mut current, patch);
        self.overrides.insert(item_type.to_string(), current.clone());
        current
    }
}
