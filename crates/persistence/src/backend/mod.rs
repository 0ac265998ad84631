//! Search store abstraction.
//!
//! The persistence facade only talks to [`SearchBackend`]; the OpenSearch
//! HTTP client and the in-memory store both implement it. Queries and
//! aggregations use the OpenSearch JSON DSL.

pub mod memory;
pub mod opensearch;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use cdp_core::config::RefreshPolicy;
use cdp_core::CdpError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use memory::MemoryBackend;
pub use opensearch::OpenSearchBackend;

/// Errors reported by a search backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),

    #[error("search backend timed out after {0}ms")]
    Timeout(u64),

    #[error("mapping conflict on '{index}': {reason}")]
    MappingConflict { index: String, reason: String },

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

impl From<BackendError> for CdpError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unavailable(msg) => CdpError::BackendUnavailable(msg),
            BackendError::Timeout(ms) => CdpError::BackendTimeout(ms),
            BackendError::MappingConflict { index, reason } => CdpError::MappingConflict { index, reason },
            BackendError::IndexNotFound(index) => {
                CdpError::BackendUnavailable(format!("index not found: {}", index))
            }
            BackendError::Protocol(msg) => CdpError::BackendUnavailable(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

impl SortField {
    /// Parse `field[:asc|:desc],field2...`. Unknown orders default to asc.
    pub fn parse_list(raw: &str) -> Vec<SortField> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|part| match part.rsplit_once(':') {
                Some((field, order)) => SortField {
                    field: field.trim().to_string(),
                    order: if order.trim().eq_ignore_ascii_case("desc") {
                        SortOrder::Desc
                    } else {
                        SortOrder::Asc
                    },
                },
                None => SortField {
                    field: part.to_string(),
                    order: SortOrder::Asc,
                },
            })
            .collect()
    }

    pub fn to_json(&self) -> Value {
        json!({ self.field.as_str(): {"order": self.order, "unmapped_type": "keyword"} })
    }
}

/// One search call against an index, an index pattern (`base-*`) or a
/// comma-separated list of either.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub indices: String,
    pub query: Value,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<SortField>,
    pub aggregations: Option<Value>,
}

impl SearchRequest {
    pub fn new(indices: impl Into<String>, query: Value) -> Self {
        Self {
            indices: indices.into(),
            query,
            from: 0,
            size: 10,
            sort: Vec::new(),
            aggregations: None,
        }
    }

    pub fn page(mut self, from: usize, size: usize) -> Self {
        self.from = from;
        self.size = size;
        self
    }

    pub fn sorted(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_aggregations(mut self, aggs: Value) -> Self {
        self.aggregations = Some(aggs);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub index: String,
    pub id: String,
    pub source: Value,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Matches across all searched partitions, independent of paging.
    pub total: u64,
    pub hits: Vec<Hit>,
    pub aggregations: Option<Value>,
    /// Partitions that could not be searched; results cover the rest.
    pub skipped_partitions: Vec<String>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    /// Create an index with a mapping. `Ok(false)` if it already existed.
    async fn create_index(&self, index: &str, mapping: &Value) -> Result<bool, BackendError>;

    /// Merge a mapping into an existing index. Changing the type of an
    /// existing field is a `MappingConflict`.
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), BackendError>;

    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, BackendError>;

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
        document: &Value,
        refresh: RefreshPolicy,
    ) -> Result<(), BackendError>;

    async fn get_document(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
    ) -> Result<Option<Value>, BackendError>;

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
        refresh: RefreshPolicy,
    ) -> Result<bool, BackendError>;

    /// Delete every document matching `query`; returns the number deleted.
    async fn delete_by_query(&self, indices: &str, query: &Value) -> Result<u64, BackendError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError>;

    /// Concrete index names matching a pattern, sorted.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, BackendError>;

    /// `Ok(false)` if the index did not exist.
    async fn delete_index(&self, index: &str) -> Result<bool, BackendError>;
}

/// Run a backend call with an upper bound on its duration.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(timeout.as_millis() as u64)),
    }
}
