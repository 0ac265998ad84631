use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use cdp_core::{CdpError, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{bounded, BackendError, SearchBackend};
use crate::mappings::MappingSet;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Where documents of an item type live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionId {
    /// The single index of a non-daily type.
    Base(String),
    /// One day's partition of a daily type.
    Daily { name: String, day: NaiveDate },
    /// Every daily partition of a type (`<base>-*`).
    AllDaily(String),
}

impl PartitionId {
    /// Index name or pattern to address.
    pub fn name(&self) -> &str {
        match self {
            PartitionId::Base(name) | PartitionId::Daily { name, .. } | PartitionId::AllDaily(name) => name,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, PartitionId::AllDaily(_))
    }
}

/// Day encoded in a daily partition name (`<base>-YYYY-MM-DD`).
pub fn partition_date(name: &str) -> Option<NaiveDate> {
    let suffix = name.get(name.len().checked_sub(10)?..)?;
    NaiveDate::parse_from_str(suffix, DAY_FORMAT).ok()
}

/// Maps item types to physical indices and creates partitions on demand.
///
/// Daily types get one index per calendar day (UTC). Existence is cached
/// after the first successful create, so concurrent first writes for the
/// same day issue at most one create each and the store resolves the race.
pub struct PartitionManager {
    backend: Arc<dyn SearchBackend>,
    prefix: String,
    daily_types: BTreeSet<String>,
    mappings: RwLock<MappingSet>,
    known: RwLock<HashSet<String>>,
    timeout: Duration,
}

impl PartitionManager {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        prefix: impl Into<String>,
        daily_types: BTreeSet<String>,
        mappings: MappingSet,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            daily_types,
            mappings: RwLock::new(mappings),
            known: RwLock::new(HashSet::new()),
            timeout,
        }
    }

    pub fn is_daily(&self, item_type: &str) -> bool {
        self.daily_types.contains(item_type)
    }

    pub fn daily_types(&self) -> impl Iterator<Item = &str> {
        self.daily_types.iter().map(String::as_str)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn base_name(&self, item_type: &str) -> String {
        format!("{}-{}", self.prefix, item_type.to_lowercase())
    }

    /// Partition naming only; nothing is created.
    pub fn target(&self, item_type: &str, timestamp: Option<DateTime<Utc>>) -> PartitionId {
        let base = self.base_name(item_type);
        if !self.is_daily(item_type) {
            return PartitionId::Base(base);
        }
        match timestamp {
            Some(ts) => {
                let day = ts.date_naive();
                PartitionId::Daily {
                    name: format!("{}-{}", base, day.format(DAY_FORMAT)),
                    day,
                }
            }
            None => PartitionId::AllDaily(format!("{}-*", base)),
        }
    }

    /// Partition to write to, created with the type's mapping if missing.
    /// Without a timestamp a daily type resolves to the wildcard.
    pub async fn resolve_partition(&self, item_type: &str, timestamp: Option<DateTime<Utc>>) -> Result<PartitionId> {
        let partition = self.target(item_type, timestamp);
        if !partition.is_wildcard() {
            self.ensure(partition.name(), item_type).await?;
        }
        Ok(partition)
    }

    fn is_known(&self, index: &str) -> bool {
        self.known
            .read()
            .expect("partition cache lock poisoned")
            .contains(index)
    }

    /// Create `index` unless the cache says it exists. Returns true if this
    /// call created it.
    async fn ensure(&self, index: &str, item_type: &str) -> Result<bool> {
        if self.is_known(index) {
            return Ok(false);
        }
        let mapping = self.mapping(item_type);
        let created = bounded(self.timeout, self.backend.create_index(index, &mapping))
            .await
            .map_err(|e| {
                warn!(index, item_type, error = %e, "failed to create partition");
                CdpError::from(e)
            })?;
        if created {
            info!(index, item_type, "created partition");
        } else {
            debug!(index, "partition already present");
        }
        self.known
            .write()
            .expect("partition cache lock poisoned")
            .insert(index.to_string());
        Ok(created)
    }

    /// Mapping new partitions of `item_type` are created with.
    pub fn mapping(&self, item_type: &str) -> Value {
        self.mappings
            .read()
            .expect("mapping registry lock poisoned")
            .get(item_type)
    }

    /// Existing daily partitions of a type, sorted by name (and so by day).
    pub async fn list_partitions(&self, item_type: &str) -> Result<Vec<String>> {
        let pattern = format!("{}-*", self.base_name(item_type));
        let names = bounded(self.timeout, self.backend.list_indices(&pattern)).await?;
        Ok(names.into_iter().filter(|n| partition_date(n).is_some()).collect())
    }

    /// Merge `patch` into the type's mapping and push it to every existing
    /// index of the type. Partitions that reject it are logged and skipped.
    pub async fn apply_mapping(&self, item_type: &str, patch: &Value) -> Result<()> {
        self.mappings
            .write()
            .expect("mapping registry lock poisoned")
            .merge(item_type, patch);

        let targets = if self.is_daily(item_type) {
            self.list_partitions(item_type).await?
        } else {
            let base = self.base_name(item_type);
            if self.ensure(&base, item_type).await? {
                return Ok(());
            }
            vec![base]
        };

        for index in targets {
            match bounded(self.timeout, self.backend.put_mapping(&index, patch)).await {
                Ok(()) => debug!(index = %index, "mapping updated"),
                Err(BackendError::MappingConflict { reason, .. }) => {
                    warn!(index = %index, item_type, reason = %reason, "mapping conflict, partition left unchanged");
                }
                Err(BackendError::IndexNotFound(_)) => {
                    self.forget(&index);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Drop a partition from the existence cache after it was deleted.
    pub fn forget(&self, index: &str) {
        self.known
            .write()
            .expect("partition cache lock poisoned")
            .remove(index);
    }
}
