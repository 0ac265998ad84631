//! Condition-driven persistence over a search store.
//!
//! [`PersistenceService`] maps item types to (optionally daily) indices,
//! compiles conditions to the store's query DSL, and answers condition
//! matches in memory where an evaluator exists.

pub mod aggregation;
pub mod backend;
pub mod mappings;
pub mod partition;
pub mod service;

pub use aggregation::{Aggregate, DateInterval};
pub use backend::{BackendError, MemoryBackend, OpenSearchBackend, SearchBackend, SearchRequest, SearchResponse};
pub use mappings::MappingSet;
pub use partition::{PartitionId, PartitionManager};
pub use service::PersistenceService;
