//! In-memory [`SearchBackend`] for tests and single-process use.
//!
//! Documents become visible immediately regardless of refresh policy.
//! Individual indices can be marked unavailable to exercise partial-failure
//! handling.

mod aggs;
mod query;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::RwLock;

use async_trait::async_trait;
use cdp_condition::value::{number_of, text_of, values_at, wildcard_match};
use cdp_core::config::RefreshPolicy;
use serde_json::{Map, Value};
use tracing::debug;

use self::query::DocRef;
use super::{BackendError, Hit, SearchBackend, SearchRequest, SearchResponse, SortField, SortOrder};

#[derive(Debug, Clone, Default)]
struct IndexState {
    mapping: Value,
    /// id → (routing, source)
    docs: BTreeMap<String, (Option<String>, Value)>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    indices: RwLock<HashMap<String, IndexState>>,
    unavailable: RwLock<HashSet<String>>,
    offline: AtomicBool,
    created: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make one index fail every call that touches it.
    pub fn set_unavailable(&self, index: &str, unavailable: bool) {
        let mut guard = self.unavailable.write().expect("memory backend lock poisoned");
        if unavailable {
            guard.insert(index.to_string());
        } else {
            guard.remove(index);
        }
    }

    /// Make every call fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Number of indices actually created (not counting "already exists").
    pub fn created_index_count(&self) -> usize {
        self.created.load(AtomicOrdering::SeqCst)
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .expect("memory backend lock poisoned")
            .get(index)
            .map(|s| s.docs.len())
            .unwrap_or(0)
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(BackendError::Unavailable("memory backend offline".to_string()));
        }
        Ok(())
    }

    fn check_index(&self, index: &str) -> Result<(), BackendError> {
        self.check_online()?;
        if self.is_unavailable(index) {
            return Err(BackendError::Unavailable(format!("index {} unavailable", index)));
        }
        Ok(())
    }

    fn is_unavailable(&self, index: &str) -> bool {
        self.unavailable
            .read()
            .expect("memory backend lock poisoned")
            .contains(index)
    }

    /// Resolve a comma-separated list of names/patterns to existing indices.
    /// A concrete name that does not exist is `IndexNotFound`.
    fn resolve(&self, pattern: &str, indices: &HashMap<String, IndexState>) -> Result<Vec<String>, BackendError> {
        let mut out = Vec::new();
        for part in pattern.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.contains('*') || part.contains('?') {
                let mut found: Vec<String> = indices
                    .keys()
                    .filter(|name| wildcard_match(part, name))
                    .cloned()
                    .collect();
                found.sort();
                out.extend(found);
            } else if indices.contains_key(part) {
                out.push(part.to_string());
            } else {
                return Err(BackendError::IndexNotFound(part.to_string()));
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }
}

/// `path → type` for every leaf of a mapping's `properties` tree.
fn leaf_types(mapping: &Value) -> BTreeMap<String, String> {
    fn walk(props: &Map<String, Value>, prefix: &str, out: &mut BTreeMap<String, String>) {
        for (name, def) in props {
            let path = if prefix.is_empty() { name.clone() } else { format!("{}.{}", prefix, name) };
            if let Some(t) = def.get("type").and_then(Value::as_str) {
                out.insert(path.clone(), t.to_string());
            }
            if let Some(Value::Object(children)) = def.get("properties") {
                walk(children, &path, out);
            }
        }
    }
    let mut out = BTreeMap::new();
    if let Some(Value::Object(props)) = mapping.get("properties") {
        walk(props, "", &mut out);
    }
    out
}

fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (k, v) in p {
                merge_json(t.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (slot, v) => *slot = v.clone(),
    }
}

/// Sort key: first value at the field; documents without one sort last.
fn compare_for_sort(a: &Value, b: &Value, sort: &SortField) -> Ordering {
    let first = |doc: &Value| values_at(doc, &sort.field).into_iter().next().cloned();
    match (first(a), first(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = match (number_of(&x).filter(|_| x.is_number()), number_of(&y).filter(|_| y.is_number())) {
                (Some(n), Some(m)) => n.partial_cmp(&m).unwrap_or(Ordering::Equal),
                _ => text_of(&x).cmp(&text_of(&y)),
            };
            match sort.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        }
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        self.check_online()?;
        Ok(self
            .indices
            .read()
            .expect("memory backend lock poisoned")
            .contains_key(index))
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<bool, BackendError> {
        self.check_index(index)?;
        let mut guard = self.indices.write().expect("memory backend lock poisoned");
        if guard.contains_key(index) {
            return Ok(false);
        }
        guard.insert(
            index.to_string(),
            IndexState {
                mapping: mapping.clone(),
                docs: BTreeMap::new(),
            },
        );
        self.created.fetch_add(1, AtomicOrdering::SeqCst);
        debug!(index, "created in-memory index");
        Ok(true)
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), BackendError> {
        self.check_index(index)?;
        let mut guard = self.indices.write().expect("memory backend lock poisoned");
        let state = guard
            .get_mut(index)
            .ok_or_else(|| BackendError::IndexNotFound(index.to_string()))?;

        let existing = leaf_types(&state.mapping);
        for (path, new_type) in leaf_types(mapping) {
            if let Some(old_type) = existing.get(&path) {
                if *old_type != new_type {
                    return Err(BackendError::MappingConflict {
                        index: index.to_string(),
                        reason: format!(
                            "mapper [{}] cannot be changed from type [{}] to [{}]",
                            path, old_type, new_type
                        ),
                    });
                }
            }
        }
        merge_json(&mut state.mapping, mapping);
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, BackendError> {
        self.check_index(index)?;
        Ok(self
            .indices
            .read()
            .expect("memory backend lock poisoned")
            .get(index)
            .map(|s| s.mapping.clone()))
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
        document: &Value,
        _refresh: RefreshPolicy,
    ) -> Result<(), BackendError> {
        self.check_index(index)?;
        let mut guard = self.indices.write().expect("memory backend lock poisoned");
        // Indexing into a missing index auto-creates it, as the real store does.
        let state = guard.entry(index.to_string()).or_insert_with(|| IndexState {
            mapping: Value::Object(Map::new()),
            docs: BTreeMap::new(),
        });
        state
            .docs
            .insert(id.to_string(), (routing.map(str::to_string), document.clone()));
        Ok(())
    }

    async fn get_document(&self, index: &str, id: &str, _routing: Option<&str>) -> Result<Option<Value>, BackendError> {
        self.check_index(index)?;
        let guard = self.indices.read().expect("memory backend lock poisoned");
        let state = guard
            .get(index)
            .ok_or_else(|| BackendError::IndexNotFound(index.to_string()))?;
        Ok(state.docs.get(id).map(|(_, source)| source.clone()))
    }

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        _routing: Option<&str>,
        _refresh: RefreshPolicy,
    ) -> Result<bool, BackendError> {
        self.check_index(index)?;
        let mut guard = self.indices.write().expect("memory backend lock poisoned");
        Ok(guard
            .get_mut(index)
            .map(|s| s.docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn delete_by_query(&self, indices: &str, query_body: &Value) -> Result<u64, BackendError> {
        self.check_online()?;
        let mut guard = self.indices.write().expect("memory backend lock poisoned");
        let names = match self.resolve(indices, &guard) {
            Ok(names) => names,
            Err(BackendError::IndexNotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut deleted = 0u64;
        for name in names {
            if self.is_unavailable(&name) {
                continue;
            }
            if let Some(state) = guard.get_mut(&name) {
                let mut doomed = Vec::new();
                for (id, (_, source)) in &state.docs {
                    if query::matches(query_body, &DocRef { id, source })? {
                        doomed.push(id.clone());
                    }
                }
                for id in doomed {
                    state.docs.remove(&id);
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        self.check_online()?;
        let guard = self.indices.read().expect("memory backend lock poisoned");
        let names = self.resolve(&request.indices, &guard)?;

        let mut skipped = Vec::new();
        let mut all: Vec<(&str, DocRef<'_>)> = Vec::new();
        for name in &names {
            if self.is_unavailable(name) {
                skipped.push(name.clone());
                continue;
            }
            if let Some(state) = guard.get(name) {
                for (id, (_, source)) in &state.docs {
                    all.push((name.as_str(), DocRef { id, source }));
                }
            }
        }
        if !names.is_empty() && skipped.len() == names.len() {
            return Err(BackendError::Unavailable(format!(
                "all partitions unavailable: {}",
                skipped.join(",")
            )));
        }

        let mut matched: Vec<(&str, DocRef<'_>)> = Vec::new();
        for (index, doc) in &all {
            if query::matches(&request.query, doc)? {
                matched.push((*index, DocRef { id: doc.id, source: doc.source }));
            }
        }

        let aggregations = match &request.aggregations {
            Some(spec) => {
                let matched_docs: Vec<DocRef<'_>> =
                    matched.iter().map(|(_, d)| DocRef { id: d.id, source: d.source }).collect();
                let all_docs: Vec<DocRef<'_>> =
                    all.iter().map(|(_, d)| DocRef { id: d.id, source: d.source }).collect();
                Some(aggs::run(spec, &matched_docs, &all_docs)?)
            }
            None => None,
        };

        matched.sort_by(|(ia, a), (ib, b)| {
            request
                .sort
                .iter()
                .map(|s| compare_for_sort(a.source, b.source, s))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
                .then_with(|| ia.cmp(ib))
                .then_with(|| a.id.cmp(b.id))
        });

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .map(|(index, d)| Hit {
                index: index.to_string(),
                id: d.id.to_string(),
                source: d.source.clone(),
            })
            .collect();

        Ok(SearchResponse {
            total,
            hits,
            aggregations,
            skipped_partitions: skipped,
        })
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        self.check_online()?;
        let guard = self.indices.read().expect("memory backend lock poisoned");
        match self.resolve(pattern, &guard) {
            Ok(names) => Ok(names),
            Err(BackendError::IndexNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<bool, BackendError> {
        self.check_index(index)?;
        Ok(self
            .indices
            .write()
            .expect("memory backend lock poisoned")
            .remove(index)
            .is_some())
    }
}
