//! Compilation of condition trees into the search store's JSON query DSL.
//!
//! Output is OpenSearch/Elasticsearch query DSL. `build_filter` produces the
//! bare clause; `build_query` wraps it in a non-scoring `bool.filter`.

mod basic;
mod boolean;
mod property;

use std::collections::HashMap;
use std::sync::Arc;

use cdp_core::{CdpError, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::trace;

use crate::condition::Condition;
use crate::registry::ConditionTypeRegistry;

pub use basic::{EventTypeQueryBuilder, IdsQueryBuilder, MatchAllQueryBuilder, NestedQueryBuilder};
pub use boolean::{BooleanQueryBuilder, NotQueryBuilder};
pub use property::PropertyQueryBuilder;

/// Date format hint attached to `range` clauses over dates.
pub const DATE_FORMAT: &str = "strict_date_optional_time||epoch_millis";

/// Compiles one kind of condition into a query clause.
pub trait ConditionQueryBuilder: Send + Sync {
    fn build(&self, condition: &Condition, ctx: &QueryContext<'_>) -> Result<Value>;
}

/// Handed to builders so composites can compile their children.
pub struct QueryContext<'a> {
    dispatcher: &'a QueryBuilderDispatcher,
    pub now: DateTime<Utc>,
}

impl QueryContext<'_> {
    pub fn build(&self, condition: &Condition) -> Result<Value> {
        self.dispatcher.dispatch(condition, self)
    }
}

pub struct QueryBuilderDispatcher {
    registry: Arc<ConditionTypeRegistry>,
    builders: HashMap<String, Arc<dyn ConditionQueryBuilder>>,
}

impl QueryBuilderDispatcher {
    /// Dispatcher with the built-in query builders registered.
    pub fn new(registry: Arc<ConditionTypeRegistry>) -> Self {
        let mut dispatcher = Self {
            registry,
            builders: HashMap::new(),
        };
        dispatcher.register("booleanConditionQueryBuilder", Arc::new(BooleanQueryBuilder));
        dispatcher.register("notConditionQueryBuilder", Arc::new(NotQueryBuilder));
        dispatcher.register("matchAllConditionQueryBuilder", Arc::new(MatchAllQueryBuilder));
        dispatcher.register("propertyConditionQueryBuilder", Arc::new(PropertyQueryBuilder));
        dispatcher.register("nestedConditionQueryBuilder", Arc::new(NestedQueryBuilder));
        dispatcher.register("idsConditionQueryBuilder", Arc::new(IdsQueryBuilder));
        dispatcher.register("eventTypeConditionQueryBuilder", Arc::new(EventTypeQueryBuilder));
        dispatcher
    }

    pub fn register(&mut self, builder_id: impl Into<String>, builder: Arc<dyn ConditionQueryBuilder>) {
        self.builders.insert(builder_id.into(), builder);
    }

    pub fn registry(&self) -> &Arc<ConditionTypeRegistry> {
        &self.registry
    }

    pub fn build_filter(&self, condition: &Condition) -> Result<Value> {
        self.build_filter_at(condition, Utc::now())
    }

    /// Compile with an explicit clock for date expressions.
    pub fn build_filter_at(&self, condition: &Condition, now: DateTime<Utc>) -> Result<Value> {
        self.registry.ensure_resolvable(condition)?;
        let ctx = QueryContext {
            dispatcher: self,
            now,
        };
        self.dispatch(condition, &ctx)
    }

    pub fn build_query(&self, condition: &Condition) -> Result<Value> {
        self.build_query_at(condition, Utc::now())
    }

    pub fn build_query_at(&self, condition: &Condition, now: DateTime<Utc>) -> Result<Value> {
        let filter = self.build_filter_at(condition, now)?;
        Ok(json!({"bool": {"filter": [filter]}}))
    }

    fn dispatch(&self, condition: &Condition, ctx: &QueryContext<'_>) -> Result<Value> {
        let condition_type = self.registry.resolve(condition)?;
        let builder = self.builders.get(&condition_type.query_builder).ok_or_else(|| {
            CdpError::Definition(format!(
                "condition type '{}' names unregistered query builder '{}'",
                condition_type.id, condition_type.query_builder
            ))
        })?;
        let clause = builder.build(condition, ctx)?;
        trace!(condition_type = %condition_type.id, "compiled condition");
        Ok(clause)
    }
}

// ── Clause helpers ──────────────────────────────────────────────────

pub fn match_all() -> Value {
    json!({"match_all": {}})
}

pub fn match_none() -> Value {
    json!({"match_none": {}})
}

pub(crate) fn must_not(clause: Value) -> Value {
    json!({"bool": {"must_not": [clause]}})
}

/// `bool.should` requiring one match; empty means nothing matches.
pub(crate) fn any_of(mut clauses: Vec<Value>) -> Value {
    match clauses.len() {
        0 => match_none(),
        1 => clauses.remove(0),
        _ => json!({"bool": {"should": clauses, "minimum_should_match": 1}}),
    }
}

/// `bool.must`; empty means everything matches.
pub(crate) fn all_of(mut clauses: Vec<Value>) -> Value {
    match clauses.len() {
        0 => json!({"bool": {}}),
        1 => clauses.remove(0),
        _ => json!({"bool": {"must": clauses}}),
    }
}
