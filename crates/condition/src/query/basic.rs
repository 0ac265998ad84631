use cdp_core::{CdpError, Result};
use serde_json::{json, Value};

use super::{match_all, must_not, ConditionQueryBuilder, QueryContext};
use crate::condition::Condition;
use crate::value::text_of;

pub struct MatchAllQueryBuilder;

impl ConditionQueryBuilder for MatchAllQueryBuilder {
    fn build(&self, _condition: &Condition, _ctx: &QueryContext<'_>) -> Result<Value> {
        Ok(match_all())
    }
}

/// Wraps the sub-query in a `nested` clause bound to `path`.
pub struct NestedQueryBuilder;

impl ConditionQueryBuilder for NestedQueryBuilder {
    fn build(&self, condition: &Condition, ctx: &QueryContext<'_>) -> Result<Value> {
        let path = condition
            .string("path")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing path"))?;
        let sub = condition
            .sub_condition("subCondition")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing subCondition"))?;
        Ok(json!({"nested": {"path": path, "query": ctx.build(sub)?}}))
    }
}

pub struct IdsQueryBuilder;

impl ConditionQueryBuilder for IdsQueryBuilder {
    fn build(&self, condition: &Condition, _ctx: &QueryContext<'_>) -> Result<Value> {
        let ids: Vec<String> = condition
            .scalar_list("ids")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing ids"))?
            .into_iter()
            .filter_map(text_of)
            .collect();
        let clause = json!({"ids": {"values": ids}});
        if condition.bool_or("match", true) {
            Ok(clause)
        } else {
            Ok(must_not(clause))
        }
    }
}

pub struct EventTypeQueryBuilder;

impl ConditionQueryBuilder for EventTypeQueryBuilder {
    fn build(&self, condition: &Condition, _ctx: &QueryContext<'_>) -> Result<Value> {
        let event_type = condition
            .string("eventTypeId")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing eventTypeId"))?;
        Ok(json!({"term": {"eventType": event_type}}))
    }
}
