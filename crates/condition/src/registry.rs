//! Condition type registry: built-in definitions plus YAML files loaded from
//! a directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use cdp_core::{CdpError, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::condition::Condition;
use crate::types::ConditionType;

const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    ("boolean.yaml", include_str!("../definitions/boolean.yaml")),
    ("property.yaml", include_str!("../definitions/property.yaml")),
    ("structural.yaml", include_str!("../definitions/structural.yaml")),
];

/// A definition file holds one type or a list of types.
#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<ConditionType>),
    One(ConditionType),
}

impl DefinitionFile {
    fn into_vec(self) -> Vec<ConditionType> {
        match self {
            DefinitionFile::Many(v) => v,
            DefinitionFile::One(t) => vec![t],
        }
    }
}

fn parse_definitions(source: &str) -> std::result::Result<Vec<ConditionType>, String> {
    let file: DefinitionFile = serde_yaml::from_str(source).map_err(|e| e.to_string())?;
    let types = file.into_vec();
    for t in &types {
        if t.id.trim().is_empty() {
            return Err("condition type with empty id".to_string());
        }
        if t.query_builder.trim().is_empty() {
            return Err(format!("condition type '{}' has no queryBuilder", t.id));
        }
    }
    Ok(types)
}

/// Outcome of loading a single definition file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded { type_ids: Vec<String> },
    Skipped { reason: String },
    Failed { error: String },
}

/// Registered condition types keyed by id.
pub struct ConditionTypeRegistry {
    types: RwLock<HashMap<String, Arc<ConditionType>>>,
}

impl ConditionTypeRegistry {
    pub fn empty() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the built-in types.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::empty();
        for (name, source) in BUILTIN_DEFINITIONS {
            let types = parse_definitions(source)
                .map_err(|e| CdpError::Definition(format!("built-in {}: {}", name, e)))?;
            for t in types {
                registry.register(t);
            }
        }
        debug!(count = registry.len(), "registered built-in condition types");
        Ok(registry)
    }

    /// Register or replace a type.
    pub fn register(&self, condition_type: ConditionType) {
        let mut guard = self.types.write().expect("condition type lock poisoned");
        if guard.contains_key(&condition_type.id) {
            debug!(type_id = %condition_type.id, "replacing condition type");
        }
        guard.insert(condition_type.id.clone(), Arc::new(condition_type));
    }

    pub fn get(&self, id: &str) -> Option<Arc<ConditionType>> {
        self.types
            .read()
            .expect("condition type lock poisoned")
            .get(id)
            .cloned()
    }

    /// Resolve the type a condition references.
    pub fn resolve(&self, condition: &Condition) -> Result<Arc<ConditionType>> {
        self.get(condition.type_id())
            .ok_or_else(|| CdpError::UnknownConditionType(condition.type_id().to_string()))
    }

    /// Resolve every node of the tree, failing on the first unknown type.
    pub fn ensure_resolvable(&self, condition: &Condition) -> Result<()> {
        self.resolve(condition)?;
        for child in condition.children() {
            self.ensure_resolvable(child)?;
        }
        Ok(())
    }

    /// Sorted ids of all registered types.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .types
            .read()
            .expect("condition type lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.types.read().expect("condition type lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every `*.yml`/`*.yaml` file of a directory (recursively).
    ///
    /// Parse errors are reported per file and do not abort the scan.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir(dir, &mut results)?;
        let loaded = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
            .count();
        info!(path = %dir.display(), files = loaded, "loaded condition definitions");
        Ok(results)
    }

    fn scan_dir(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read definitions directory");
                return Ok(());
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        paths.sort();

        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir(&path, results)?;
                continue;
            }

            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);
            if !is_yaml {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            let status = match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| parse_definitions(&s))
            {
                Ok(types) => {
                    let type_ids: Vec<String> = types.iter().map(|t| t.id.clone()).collect();
                    for t in types {
                        info!(type_id = %t.id, path = %path.display(), "loaded condition type");
                        self.register(t);
                    }
                    LoadStatus::Loaded { type_ids }
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "failed to load condition definitions");
                    LoadStatus::Failed { error }
                }
            };
            results.push(LoadResult { path, status });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConditionTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionTypeRegistry")
            .field("types", &self.ids())
            .finish()
    }
}
