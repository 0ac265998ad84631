use cdp_core::{CdpError, Result};
use serde_json::Value;

use super::{all_of, any_of, must_not, ConditionQueryBuilder, QueryContext};
use crate::condition::Condition;

/// `and` → `bool.must`, `or` → `bool.should` with one required match.
pub struct BooleanQueryBuilder;

impl ConditionQueryBuilder for BooleanQueryBuilder {
    fn build(&self, condition: &Condition, ctx: &QueryContext<'_>) -> Result<Value> {
        let subs = condition.sub_conditions("subConditions").ok_or_else(|| {
            CdpError::invalid_condition(condition.type_id(), "missing subConditions")
        })?;
        let clauses = subs
            .iter()
            .map(|sub| ctx.build(sub))
            .collect::<Result<Vec<_>>>()?;
        match condition.string("operator").unwrap_or("and") {
            "and" => Ok(all_of(clauses)),
            "or" => Ok(any_of(clauses)),
            other => Err(CdpError::invalid_condition(
                condition.type_id(),
                format!("unknown boolean operator '{}'", other),
            )),
        }
    }
}

pub struct NotQueryBuilder;

impl ConditionQueryBuilder for NotQueryBuilder {
    fn build(&self, condition: &Condition, ctx: &QueryContext<'_>) -> Result<Value> {
        let sub = condition
            .sub_condition("subCondition")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing subCondition"))?;
        Ok(must_not(ctx.build(sub)?))
    }
}
