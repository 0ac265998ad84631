use cdp_core::item::ITEM_ID_FIELD;
use cdp_core::{CdpError, Result};
use serde_json::Value;

use super::{ConditionEvaluator, EvaluationContext};
use crate::condition::Condition;
use crate::value::{equals, text_of, values_at, Operand};

pub struct MatchAllEvaluator;

impl ConditionEvaluator for MatchAllEvaluator {
    fn eval(&self, _condition: &Condition, _item: &Value, _ctx: &EvaluationContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// Item id membership, inverted when `match` is false.
pub struct IdsEvaluator;

impl ConditionEvaluator for IdsEvaluator {
    fn eval(&self, condition: &Condition, item: &Value, _ctx: &EvaluationContext<'_>) -> Result<bool> {
        let ids = condition
            .scalar_list("ids")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing ids"))?;
        let item_id = item.get(ITEM_ID_FIELD).and_then(text_of);
        let listed = item_id
            .map(|id| ids.iter().any(|v| text_of(v).as_deref() == Some(id.as_str())))
            .unwrap_or(false);
        Ok(listed == condition.bool_or("match", true))
    }
}

pub struct EventTypeEvaluator;

impl ConditionEvaluator for EventTypeEvaluator {
    fn eval(&self, condition: &Condition, item: &Value, _ctx: &EvaluationContext<'_>) -> Result<bool> {
        let event_type = condition
            .string("eventTypeId")
            .ok_or_else(|| CdpError::invalid_condition(condition.type_id(), "missing eventTypeId"))?;
        let operand = Operand::Text(event_type.to_string());
        Ok(values_at(item, "eventType").iter().any(|v| equals(v, &operand)))
    }
}
