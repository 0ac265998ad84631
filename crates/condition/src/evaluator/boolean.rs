use cdp_core::{CdpError, Result};
use serde_json::Value;

use super::{ConditionEvaluator, EvaluationContext};
use crate::condition::Condition;

/// `and` / `or` over `subConditions`, short-circuiting.
pub struct BooleanEvaluator;

impl ConditionEvaluator for BooleanEvaluator {
    fn eval(&self, condition: &Condition, item: &Value, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let subs = condition.sub_conditions("subConditions").ok_or_else(|| {
            CdpError::invalid_condition(condition.type_id(), "missing subConditions")
        })?;
        match condition.string("operator").unwrap_or("and") {
            "and" => {
                for sub in subs {
                    if !ctx.evaluate(sub, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "or" => {
                for sub in subs {
                    if ctx.evaluate(sub, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(CdpError::invalid_condition(
                condition.type_id(),
                format!("unknown boolean operator '{}'", other),
            )),
        }
    }
}

pub struct NotEvaluator;

impl ConditionEvaluator for NotEvaluator {
    fn eval(&self, condition: &Condition, item: &Value, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let sub = condition
            .sub_condition("subCondition")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing subCondition"))?;
        Ok(!ctx.evaluate(sub, item)?)
    }
}
