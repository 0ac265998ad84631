use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cdp_condition::query::match_all;
use cdp_condition::value::{text_of, values_at};
use cdp_condition::{
    Condition, ConditionEvaluator, ConditionEvaluatorDispatcher, ConditionQueryBuilder,
    ConditionTypeRegistry, QueryBuilderDispatcher,
};
use cdp_core::config::{Config, RefreshPolicy};
use cdp_core::{from_document, to_document, CdpError, Event, Item, PartialList, Profile, Result, Session};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregation::{self, Aggregate, ALL_KEY};
use crate::backend::{bounded, BackendError, SearchBackend, SearchRequest, SearchResponse, SortField};
use crate::mappings::MappingSet;
use crate::partition::{partition_date, PartitionId, PartitionManager};

/// Typed load/save/query over a [`SearchBackend`], driven by conditions.
///
/// Every backend call is bounded by the configured request timeout. Backend
/// errors are logged here with their context and returned as [`CdpError`].
pub struct PersistenceService {
    backend: Arc<dyn SearchBackend>,
    partitions: PartitionManager,
    evaluators: ConditionEvaluatorDispatcher,
    queries: QueryBuilderDispatcher,
    routing: HashMap<String, String>,
    refresh: RefreshPolicy,
    timeout: Duration,
    bucket_size: u32,
}

impl PersistenceService {
    pub fn new(config: &Config, backend: Arc<dyn SearchBackend>, registry: Arc<ConditionTypeRegistry>) -> Result<Self> {
        let mappings = MappingSet::new(config.persistence.mappings_dir.as_deref())?;
        let timeout = Duration::from_millis(config.search.request_timeout_ms);
        let partitions = PartitionManager::new(
            backend.clone(),
            config.persistence.index_prefix.clone(),
            config.persistence.daily_item_types.clone(),
            mappings,
            timeout,
        );
        Ok(Self {
            backend,
            partitions,
            evaluators: ConditionEvaluatorDispatcher::new(registry.clone()),
            queries: QueryBuilderDispatcher::new(registry),
            routing: config.persistence.routing_by_type.clone(),
            refresh: config.search.refresh_policy,
            timeout,
            bucket_size: config.search.aggregate_bucket_size,
        })
    }

    /// Service with the built-in condition types plus any definitions found
    /// in the configured definitions directory.
    pub fn from_config(config: &Config, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        let registry = ConditionTypeRegistry::with_builtins()?;
        if let Some(dir) = &config.persistence.condition_definitions_dir {
            let results = registry.load_dir(dir)?;
            info!(dir = %dir.display(), files = results.len(), "loaded condition definitions");
        }
        Self::new(config, backend, Arc::new(registry))
    }

    pub fn register_evaluator(&mut self, evaluator_id: impl Into<String>, evaluator: Arc<dyn ConditionEvaluator>) {
        self.evaluators.register(evaluator_id, evaluator);
    }

    pub fn register_query_builder(&mut self, builder_id: impl Into<String>, builder: Arc<dyn ConditionQueryBuilder>) {
        self.queries.register(builder_id, builder);
    }

    pub fn registry(&self) -> &Arc<ConditionTypeRegistry> {
        self.queries.registry()
    }

    pub fn partitions(&self) -> &PartitionManager {
        &self.partitions
    }

    pub fn evaluators(&self) -> &ConditionEvaluatorDispatcher {
        &self.evaluators
    }

    pub fn query_builders(&self) -> &QueryBuilderDispatcher {
        &self.queries
    }

    async fn call<T, F>(&self, fut: F) -> std::result::Result<T, BackendError>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        bounded(self.timeout, fut).await
    }

    fn routing_value(&self, item_type: &str, doc: &Value) -> Option<String> {
        let field = self.routing.get(item_type)?;
        values_at(doc, field).into_iter().find_map(text_of)
    }

    fn search_target(&self, item_type: &str) -> String {
        self.partitions.target(item_type, None).name().to_string()
    }

    async fn search(&self, request: &SearchRequest) -> std::result::Result<SearchResponse, BackendError> {
        let response = self.call(self.backend.search(request)).await?;
        if !response.skipped_partitions.is_empty() {
            warn!(
                indices = %request.indices,
                skipped = ?response.skipped_partitions,
                "partial results, some partitions could not be searched"
            );
        }
        Ok(response)
    }

    // ── Single items ──────────────────────────────────────────

    /// Load an item by id. `date_hint` narrows a daily type to one partition.
    pub async fn load<T: Item>(&self, id: &str, date_hint: Option<DateTime<Utc>>) -> Result<Option<T>> {
        let item_type = T::ITEM_TYPE;
        let target = self.partitions.target(item_type, date_hint);
        let routed = self.routing.contains_key(item_type);

        if !target.is_wildcard() && !routed {
            return match self.call(self.backend.get_document(target.name(), id, None)).await {
                Ok(Some(source)) => Ok(Some(from_document(id, source)?)),
                Ok(None) | Err(BackendError::IndexNotFound(_)) => Ok(None),
                Err(e) => {
                    warn!(item_type, item_id = id, index = target.name(), error = %e, "load failed");
                    Err(e.into())
                }
            };
        }

        let request = SearchRequest::new(target.name(), json!({"ids": {"values": [id]}})).page(0, 1);
        match self.search(&request).await {
            Ok(response) => match response.hits.into_iter().next() {
                Some(hit) => Ok(Some(from_document(&hit.id, hit.source)?)),
                None => Ok(None),
            },
            Err(BackendError::IndexNotFound(_)) => Ok(None),
            Err(e) => {
                warn!(item_type, item_id = id, index = target.name(), error = %e, "load failed");
                Err(e.into())
            }
        }
    }

    /// Store an item, assigning a fresh id when it has none. Returns the id.
    pub async fn save<T: Item>(&self, item: &mut T) -> Result<String> {
        let item_type = T::ITEM_TYPE;
        if item.item_id().is_empty() {
            item.set_item_id(Uuid::new_v4().to_string());
        }
        let id = item.item_id().to_string();

        let timestamp = if self.partitions.is_daily(item_type) {
            let ts = item.timestamp().ok_or_else(|| CdpError::MissingTimestamp {
                item_type: item_type.to_string(),
                item_id: id.clone(),
            })?;
            Some(ts)
        } else {
            None
        };

        let partition = self.partitions.resolve_partition(item_type, timestamp).await?;
        let doc = to_document(item)?;
        let routing = self.routing_value(item_type, &doc);

        self.call(self.backend.index_document(
            partition.name(),
            &id,
            routing.as_deref(),
            &doc,
            self.refresh,
        ))
        .await
        .map_err(|e| {
            warn!(item_type, item_id = %id, index = partition.name(), error = %e, "save failed");
            CdpError::from(e)
        })?;
        debug!(item_type, item_id = %id, index = partition.name(), "saved item");
        Ok(id)
    }

    /// Remove an item by id; daily types are removed from every partition.
    pub async fn remove<T: Item>(&self, id: &str) -> Result<bool> {
        let item_type = T::ITEM_TYPE;
        let target = self.partitions.target(item_type, None);

        let result = match &target {
            PartitionId::Base(index) if !self.routing.contains_key(item_type) => {
                self.call(self.backend.delete_document(index, id, None, self.refresh))
                    .await
            }
            _ => self
                .call(self.backend.delete_by_query(target.name(), &json!({"ids": {"values": [id]}})))
                .await
                .map(|deleted| deleted > 0),
        };
        match result {
            Ok(removed) => Ok(removed),
            Err(BackendError::IndexNotFound(_)) => Ok(false),
            Err(e) => {
                warn!(item_type, item_id = id, error = %e, "remove failed");
                Err(e.into())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Items of type `T` matching `condition` (all items when `None`).
    /// `sort` is a `field[:asc|:desc]` comma list.
    pub async fn query<T: Item>(
        &self,
        condition: Option<&Condition>,
        sort: Option<&str>,
        offset: usize,
        size: usize,
    ) -> Result<PartialList<T>> {
        let item_type = T::ITEM_TYPE;
        let query = match condition {
            Some(c) => self.queries.build_query(c)?,
            None => match_all(),
        };
        let request = SearchRequest::new(self.search_target(item_type), query)
            .page(offset, size)
            .sorted(sort.map(SortField::parse_list).unwrap_or_default());

        let response = match self.search(&request).await {
            Ok(r) => r,
            Err(BackendError::IndexNotFound(_)) => return Ok(PartialList::empty(offset, size)),
            Err(e) => {
                warn!(
                    item_type,
                    condition = %condition.map(ToString::to_string).unwrap_or_default(),
                    error = %e,
                    "query failed"
                );
                return Err(e.into());
            }
        };

        PartialList::new(response.hits, offset, size, response.total)
            .try_map(|hit| from_document(&hit.id, hit.source))
    }

    pub async fn query_by_field<T: Item>(
        &self,
        field: &str,
        value: Value,
        sort: Option<&str>,
        offset: usize,
        size: usize,
    ) -> Result<PartialList<T>> {
        let condition = Condition::property(field, "equals", value);
        self.query(Some(&condition), sort, offset, size).await
    }

    pub async fn query_by_values<T: Item>(
        &self,
        field: &str,
        values: Vec<Value>,
        sort: Option<&str>,
        offset: usize,
        size: usize,
    ) -> Result<PartialList<T>> {
        let condition = Condition::property_values(field, "in", values);
        self.query(Some(&condition), sort, offset, size).await
    }

    /// Number of items of `item_type` matching `condition`.
    pub async fn query_count(&self, condition: &Condition, item_type: &str) -> Result<u64> {
        let filter = self.queries.build_filter(condition)?;
        let request = SearchRequest::new(self.search_target(item_type), match_all())
            .page(0, 0)
            .with_aggregations(json!({"counter": {"filter": filter}}));

        match self.search(&request).await {
            Ok(response) => Ok(response
                .aggregations
                .as_ref()
                .and_then(|a| a.pointer("/counter/doc_count"))
                .and_then(Value::as_u64)
                .unwrap_or(0)),
            Err(BackendError::IndexNotFound(_)) => Ok(0),
            Err(e) => {
                warn!(item_type, condition = %condition, error = %e, "count failed");
                Err(e.into())
            }
        }
    }

    /// Whether `item` satisfies `condition`. Conditions without an in-memory
    /// evaluator are answered by the store, restricted to the item's id.
    pub async fn test_match<T: Item>(&self, condition: &Condition, item: &T) -> Result<bool> {
        match self.evaluators.evaluate_item(condition, item) {
            Err(CdpError::UnsupportedCondition(condition_type)) => {
                debug!(
                    item_type = T::ITEM_TYPE,
                    item_id = item.item_id(),
                    condition_type = %condition_type,
                    "no evaluator, matching through the store"
                );
                let restricted = Condition::and(vec![
                    Condition::ids(&[item.item_id()], true),
                    condition.clone(),
                ]);
                Ok(self.query_count(&restricted, T::ITEM_TYPE).await? > 0)
            }
            other => other,
        }
    }

    /// Bucket counts of `item_type` documents.
    pub async fn aggregate_query(
        &self,
        condition: Option<&Condition>,
        aggregate: Option<&Aggregate>,
        item_type: &str,
    ) -> Result<IndexMap<String, u64>> {
        let filter = condition.map(|c| self.queries.build_filter(c)).transpose()?;
        let aggs = aggregation::request(filter.as_ref(), aggregate, self.bucket_size);
        let request = SearchRequest::new(self.search_target(item_type), match_all())
            .page(0, 0)
            .with_aggregations(aggs);

        match self.search(&request).await {
            Ok(response) => {
                let body = response.aggregations.unwrap_or(Value::Null);
                Ok(aggregation::flatten(&body, filter.is_some(), aggregate))
            }
            Err(BackendError::IndexNotFound(_)) => {
                let mut empty = IndexMap::new();
                empty.insert(ALL_KEY.to_string(), 0);
                Ok(empty)
            }
            Err(e) => {
                warn!(item_type, error = %e, "aggregation failed");
                Err(e.into())
            }
        }
    }

    // ── Mappings ──────────────────────────────────────────────

    /// Mapping in effect for `item_type`.
    pub async fn get_mapping(&self, item_type: &str) -> Result<Value> {
        if self.partitions.is_daily(item_type) {
            return Ok(self.partitions.mapping(item_type));
        }
        let index = self.partitions.base_name(item_type);
        match self.call(self.backend.get_mapping(&index)).await {
            Ok(Some(mapping)) => Ok(mapping),
            Ok(None) | Err(BackendError::IndexNotFound(_)) => Ok(self.partitions.mapping(item_type)),
            Err(e) => Err(e.into()),
        }
    }

    /// Add fields to the mapping of `item_type`.
    pub async fn create_mapping(&self, item_type: &str, mapping: &Value) -> Result<()> {
        self.partitions.apply_mapping(item_type, mapping).await
    }

    // ── Deletion ──────────────────────────────────────────────

    /// Delete every item of `item_type` matching `condition`. Returns the
    /// number deleted.
    pub async fn remove_by_query(&self, condition: &Condition, item_type: &str) -> Result<u64> {
        let filter = self.queries.build_filter(condition)?;
        let target = self.search_target(item_type);
        match self.call(self.backend.delete_by_query(&target, &filter)).await {
            Ok(deleted) => {
                info!(item_type, condition = %condition, deleted, "removed by query");
                Ok(deleted)
            }
            Err(BackendError::IndexNotFound(_)) => Ok(0),
            Err(e) => {
                warn!(item_type, condition = %condition, error = %e, "remove by query failed");
                Err(e.into())
            }
        }
    }

    /// Drop daily partitions whose day is before `date`. Returns the deleted
    /// partition names.
    pub async fn purge_before(&self, date: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = date.date_naive();
        let mut purged = Vec::new();
        let daily: Vec<String> = self.partitions.daily_types().map(str::to_string).collect();
        for item_type in daily {
            for index in self.partitions.list_partitions(&item_type).await? {
                if partition_date(&index).map(|d| d >= cutoff).unwrap_or(true) {
                    continue;
                }
                match self.call(self.backend.delete_index(&index)).await {
                    Ok(_) | Err(BackendError::IndexNotFound(_)) => {
                        self.partitions.forget(&index);
                        info!(index = %index, item_type = %item_type, "purged partition");
                        purged.push(index);
                    }
                    Err(e) => {
                        warn!(index = %index, error = %e, "failed to purge partition");
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(purged)
    }

    /// Item types holding tenant data: profiles, sessions, events and every
    /// configured daily or routed type.
    pub fn scoped_item_types(&self) -> BTreeSet<String> {
        let mut types: BTreeSet<String> = [Profile::ITEM_TYPE, Session::ITEM_TYPE, Event::ITEM_TYPE]
            .into_iter()
            .map(str::to_string)
            .collect();
        types.extend(self.partitions.daily_types().map(str::to_string));
        types.extend(self.routing.keys().cloned());
        types
    }

    /// Delete every tenant document in `scope`. Indices of other types
    /// sharing the prefix (cluster nodes) are left alone.
    pub async fn purge_scope(&self, scope: &str) -> Result<u64> {
        let query = json!({"term": {"scope": scope}});
        let mut deleted = 0;
        for item_type in self.scoped_item_types() {
            let target = self.search_target(&item_type);
            match self.call(self.backend.delete_by_query(&target, &query)).await {
                Ok(n) => deleted += n,
                Err(BackendError::IndexNotFound(_)) => {}
                Err(e) => {
                    warn!(scope, item_type = %item_type, index = %target, error = %e, "scope purge failed");
                    return Err(e.into());
                }
            }
        }
        info!(scope, deleted, "purged scope");
        Ok(deleted)
    }
}
