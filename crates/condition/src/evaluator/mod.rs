//! In-memory condition evaluation.
//!
//! Each registered condition type names an evaluator id; the dispatcher maps
//! ids to [`ConditionEvaluator`] implementations. Items are evaluated in
//! their stored document form, the same shape the query side targets.

mod basic;
mod boolean;
mod property;

use std::collections::HashMap;
use std::sync::Arc;

use cdp_core::item::{to_document, Item};
use cdp_core::{CdpError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

use crate::condition::Condition;
use crate::registry::ConditionTypeRegistry;

pub use basic::{EventTypeEvaluator, IdsEvaluator, MatchAllEvaluator};
pub use boolean::{BooleanEvaluator, NotEvaluator};
pub use property::PropertyEvaluator;

/// Evaluates one kind of condition against a document.
pub trait ConditionEvaluator: Send + Sync {
    fn eval(&self, condition: &Condition, item: &Value, ctx: &EvaluationContext<'_>) -> Result<bool>;
}

/// Handed to evaluators so composites can recurse through the dispatcher.
pub struct EvaluationContext<'a> {
    dispatcher: &'a ConditionEvaluatorDispatcher,
    pub now: DateTime<Utc>,
}

impl EvaluationContext<'_> {
    pub fn evaluate(&self, condition: &Condition, item: &Value) -> Result<bool> {
        self.dispatcher.dispatch(condition, item, self)
    }
}

pub struct ConditionEvaluatorDispatcher {
    registry: Arc<ConditionTypeRegistry>,
    evaluators: HashMap<String, Arc<dyn ConditionEvaluator>>,
}

impl ConditionEvaluatorDispatcher {
    /// Dispatcher with the built-in evaluators registered.
    pub fn new(registry: Arc<ConditionTypeRegistry>) -> Self {
        let mut dispatcher = Self {
            registry,
            evaluators: HashMap::new(),
        };
        dispatcher.register("booleanConditionEvaluator", Arc::new(BooleanEvaluator));
        dispatcher.register("notConditionEvaluator", Arc::new(NotEvaluator));
        dispatcher.register("matchAllConditionEvaluator", Arc::new(MatchAllEvaluator));
        dispatcher.register("propertyConditionEvaluator", Arc::new(PropertyEvaluator));
        dispatcher.register("idsConditionEvaluator", Arc::new(IdsEvaluator));
        dispatcher.register("eventTypeConditionEvaluator", Arc::new(EventTypeEvaluator));
        dispatcher
    }

    pub fn register(&mut self, evaluator_id: impl Into<String>, evaluator: Arc<dyn ConditionEvaluator>) {
        self.evaluators.insert(evaluator_id.into(), evaluator);
    }

    pub fn registry(&self) -> &Arc<ConditionTypeRegistry> {
        &self.registry
    }

    /// Evaluate against a stored-form document.
    pub fn evaluate(&self, condition: &Condition, item: &Value) -> Result<bool> {
        self.evaluate_at(condition, item, Utc::now())
    }

    /// Evaluate with an explicit clock for date expressions.
    pub fn evaluate_at(&self, condition: &Condition, item: &Value, now: DateTime<Utc>) -> Result<bool> {
        self.registry.ensure_resolvable(condition)?;
        let ctx = EvaluationContext {
            dispatcher: self,
            now,
        };
        self.dispatch(condition, item, &ctx)
    }

    /// Evaluate against a typed item.
    pub fn evaluate_item<T: Item>(&self, condition: &Condition, item: &T) -> Result<bool> {
        let doc = to_document(item)?;
        self.evaluate(condition, &doc)
    }

    fn dispatch(&self, condition: &Condition, item: &Value, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let condition_type = self.registry.resolve(condition)?;
        let evaluator = condition_type
            .evaluator
            .as_deref()
            .and_then(|id| self.evaluators.get(id))
            .ok_or_else(|| CdpError::UnsupportedCondition(condition_type.id.clone()))?;
        let matched = evaluator.eval(condition, item, ctx)?;
        trace!(condition_type = %condition_type.id, matched, "evaluated condition");
        Ok(matched)
    }
}
