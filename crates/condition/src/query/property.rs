use cdp_core::Result;
use serde_json::{json, Map, Value};

use super::{all_of, any_of, must_not, ConditionQueryBuilder, QueryContext, DATE_FORMAT};
use crate::condition::Condition;
use crate::property::{ComparisonOperator, PropertyComparison};
use crate::value::{escape_wildcard, Operand};

pub struct PropertyQueryBuilder;

impl ConditionQueryBuilder for PropertyQueryBuilder {
    fn build(&self, condition: &Condition, ctx: &QueryContext<'_>) -> Result<Value> {
        let comparison = PropertyComparison::from_condition(condition, ctx.now)?;
        Ok(clause(&comparison))
    }
}

pub(crate) fn clause(cmp: &PropertyComparison) -> Value {
    use ComparisonOperator::*;

    let field = cmp.field.as_str();
    let ops = &cmp.operands;
    let first = ops.first();

    match cmp.operator {
        Exists => exists(field),
        Missing => must_not(exists(field)),
        Equals => first.map(|o| equals(field, o)).unwrap_or_else(super::match_none),
        NotEquals => must_not(first.map(|o| equals(field, o)).unwrap_or_else(super::match_none)),
        GreaterThan => range(field, &[("gt", first)]),
        GreaterThanOrEqualTo => range(field, &[("gte", first)]),
        LessThan => range(field, &[("lt", first)]),
        LessThanOrEqualTo => range(field, &[("lte", first)]),
        Between => range(field, &[("gte", ops.first()), ("lte", ops.get(1))]),
        Contains => wildcard(field, &format!("*{}*", escape_wildcard(&text(first)))),
        EndsWith => wildcard(field, &format!("*{}", escape_wildcard(&text(first)))),
        StartsWith => json!({"prefix": {field: {"value": text(first)}}}),
        MatchesRegex => json!({"regexp": {field: {"value": text(first)}}}),
        In => one_of(field, ops),
        NotIn => must_not(one_of(field, ops)),
        All => all_of(ops.iter().map(|o| equals(field, o)).collect()),
        InContains => any_of(
            ops.iter()
                .map(|o| wildcard(field, &format!("*{}*", escape_wildcard(&o.as_text()))))
                .collect(),
        ),
    }
}

fn text(operand: Option<&Operand>) -> String {
    operand.map(Operand::as_text).unwrap_or_default()
}

fn exists(field: &str) -> Value {
    json!({"exists": {"field": field}})
}

fn wildcard(field: &str, pattern: &str) -> Value {
    json!({"wildcard": {field: {"value": pattern}}})
}

/// Dates compare as instants, so date equality is a closed range.
fn equals(field: &str, operand: &Operand) -> Value {
    if operand.is_date() {
        range(field, &[("gte", Some(operand)), ("lte", Some(operand))])
    } else {
        json!({"term": {field: operand.to_json()}})
    }
}

fn one_of(field: &str, operands: &[Operand]) -> Value {
    if operands.iter().any(Operand::is_date) {
        any_of(operands.iter().map(|o| equals(field, o)).collect())
    } else {
        let values: Vec<Value> = operands.iter().map(Operand::to_json).collect();
        json!({"terms": {field: values}})
    }
}

fn range(field: &str, bounds: &[(&str, Option<&Operand>)]) -> Value {
    let mut body = Map::new();
    let mut dates = false;
    for (key, operand) in bounds {
        if let Some(o) = operand {
            dates |= o.is_date();
            body.insert(key.to_string(), o.to_json());
        }
    }
    if dates {
        body.insert("format".to_string(), Value::String(DATE_FORMAT.to_string()));
    }
    json!({"range": {field: body}})
}
