use std::cmp::Ordering;

use cdp_core::Result;
use serde_json::Value;

use super::{ConditionEvaluator, EvaluationContext};
use crate::condition::Condition;
use crate::property::{ComparisonOperator, PropertyComparison};
use crate::value::{compare, equals, text_of, values_at, Operand};

/// Property comparisons. A multi-valued field matches when any of its
/// values satisfies the comparison; negated operators invert the positive
/// form over the whole field.
pub struct PropertyEvaluator;

impl ConditionEvaluator for PropertyEvaluator {
    fn eval(&self, condition: &Condition, item: &Value, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let comparison = PropertyComparison::from_condition(condition, ctx.now)?;
        Ok(matches(&comparison, item))
    }
}

pub(crate) fn matches(cmp: &PropertyComparison, item: &Value) -> bool {
    use ComparisonOperator::*;

    let values = values_at(item, &cmp.field);
    let ops = &cmp.operands;
    let any_ordered = |accept: fn(Ordering) -> bool| {
        ops.first()
            .map(|o| values.iter().any(|v| compare(v, o).map(accept).unwrap_or(false)))
            .unwrap_or(false)
    };
    let any_equal = |o: &Operand| values.iter().any(|v| equals(v, o));
    let any_text = |pred: &dyn Fn(&str) -> bool| {
        values.iter().any(|v| text_of(v).map(|t| pred(t.as_str())).unwrap_or(false))
    };

    match cmp.operator {
        Exists => !values.is_empty(),
        Missing => values.is_empty(),
        Equals => ops.first().map(any_equal).unwrap_or(false),
        NotEquals => !ops.first().map(any_equal).unwrap_or(false),
        GreaterThan => any_ordered(|o| o == Ordering::Greater),
        GreaterThanOrEqualTo => any_ordered(|o| o != Ordering::Less),
        LessThan => any_ordered(|o| o == Ordering::Less),
        LessThanOrEqualTo => any_ordered(|o| o != Ordering::Greater),
        Between => match (ops.first(), ops.get(1)) {
            (Some(lo), Some(hi)) => values.iter().any(|v| {
                matches!(compare(v, lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(v, hi), Some(Ordering::Less | Ordering::Equal))
            }),
            _ => false,
        },
        Contains => {
            let needle = first_text(ops);
            any_text(&|t: &str| t.contains(needle.as_str()))
        }
        StartsWith => {
            let prefix = first_text(ops);
            any_text(&|t: &str| t.starts_with(prefix.as_str()))
        }
        EndsWith => {
            let suffix = first_text(ops);
            any_text(&|t: &str| t.ends_with(suffix.as_str()))
        }
        MatchesRegex => match &cmp.regex {
            Some(re) => any_text(&|t: &str| re.is_match(t)),
            None => false,
        },
        In => ops.iter().any(any_equal),
        NotIn => !ops.iter().any(any_equal),
        All => ops.iter().all(any_equal),
        InContains => {
            let needles: Vec<String> = ops.iter().map(Operand::as_text).collect();
            any_text(&|t: &str| needles.iter().any(|n| t.contains(n.as_str())))
        }
    }
}

fn first_text(ops: &[Operand]) -> String {
    ops.first().map(Operand::as_text).unwrap_or_default()
}
