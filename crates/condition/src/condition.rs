//! Condition tree nodes and builders.
//!
//! A [`Condition`] is a type id plus named parameter values. Composites
//! (`and`/`or`/`not`) are ordinary conditions whose parameters hold other
//! conditions, so trees are built bottom-up and are acyclic by construction.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BOOLEAN_CONDITION: &str = "booleanCondition";
pub const NOT_CONDITION: &str = "notCondition";
pub const MATCH_ALL_CONDITION: &str = "matchAllCondition";
pub const PROPERTY_CONDITION: &str = "propertyCondition";
pub const NESTED_CONDITION: &str = "nestedCondition";
pub const IDS_CONDITION: &str = "idsCondition";
pub const EVENT_TYPE_CONDITION: &str = "eventTypeCondition";

/// A parameter value: a scalar (including scalar arrays), one nested
/// condition, or an ordered list of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Condition(Box<Condition>),
    Conditions(Vec<Condition>),
    Scalar(Value),
}

impl From<Value> for ParameterValue {
    fn from(v: Value) -> Self {
        ParameterValue::Scalar(v)
    }
}

impl From<Condition> for ParameterValue {
    fn from(c: Condition) -> Self {
        ParameterValue::Condition(Box::new(c))
    }
}

impl From<Vec<Condition>> for ParameterValue {
    fn from(c: Vec<Condition>) -> Self {
        ParameterValue::Conditions(c)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    type_id: String,
    #[serde(default)]
    parameter_values: BTreeMap<String, ParameterValue>,
}

impl Condition {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            parameter_values: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameter_values.insert(name.into(), value.into());
        self
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParameterValue> {
        &self.parameter_values
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameter_values.get(name)
    }

    /// Scalar parameter, ignoring JSON null.
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.parameter_values.get(name) {
            Some(ParameterValue::Scalar(Value::Null)) => None,
            Some(ParameterValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.scalar(name).and_then(Value::as_str)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.scalar(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Scalar list parameter. An empty list deserialized as an empty
    /// condition list is treated as an empty scalar list.
    pub fn scalar_list(&self, name: &str) -> Option<Vec<&Value>> {
        match self.parameter_values.get(name)? {
            ParameterValue::Scalar(Value::Array(items)) => Some(items.iter().collect()),
            ParameterValue::Scalar(Value::Null) => None,
            ParameterValue::Scalar(single) => Some(vec![single]),
            ParameterValue::Conditions(c) if c.is_empty() => Some(Vec::new()),
            _ => None,
        }
    }

    pub fn sub_condition(&self, name: &str) -> Option<&Condition> {
        match self.parameter_values.get(name)? {
            ParameterValue::Condition(c) => Some(c),
            _ => None,
        }
    }

    pub fn sub_conditions(&self, name: &str) -> Option<&[Condition]> {
        match self.parameter_values.get(name)? {
            ParameterValue::Conditions(c) => Some(c),
            ParameterValue::Scalar(Value::Array(a)) if a.is_empty() => Some(&[]),
            _ => None,
        }
    }

    /// Direct children (nested condition parameters), in parameter order.
    pub fn children(&self) -> impl Iterator<Item = &Condition> {
        self.parameter_values.values().flat_map(|v| match v {
            ParameterValue::Condition(c) => std::slice::from_ref(c.as_ref()).iter(),
            ParameterValue::Conditions(cs) => cs.iter(),
            ParameterValue::Scalar(_) => [].iter(),
        })
    }

    // ── Builders ──────────────────────────────────────────────

    pub fn and(subs: Vec<Condition>) -> Self {
        Self::boolean("and", subs)
    }

    pub fn or(subs: Vec<Condition>) -> Self {
        Self::boolean("or", subs)
    }

    fn boolean(operator: &str, subs: Vec<Condition>) -> Self {
        Self::new(BOOLEAN_CONDITION)
            .with_parameter("operator", Value::String(operator.to_string()))
            .with_parameter("subConditions", subs)
    }

    pub fn not(sub: Condition) -> Self {
        Self::new(NOT_CONDITION).with_parameter("subCondition", sub)
    }

    pub fn match_all() -> Self {
        Self::new(MATCH_ALL_CONDITION)
    }

    /// Property comparison. The value slot is picked from the JSON kind:
    /// integers go to `propertyValueInteger`, other numbers to
    /// `propertyValueDouble`, everything else to `propertyValue`.
    pub fn property(name: impl Into<String>, operator: &str, value: Value) -> Self {
        let slot = match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => "propertyValueInteger",
            Value::Number(_) => "propertyValueDouble",
            _ => "propertyValue",
        };
        Self::property_base(name, operator).with_parameter(slot, value)
    }

    /// Property comparison without operand (`exists`, `missing`).
    pub fn property_check(name: impl Into<String>, operator: &str) -> Self {
        Self::property_base(name, operator)
    }

    pub fn property_date(name: impl Into<String>, operator: &str, value: DateTime<Utc>) -> Self {
        Self::property_base(name, operator).with_parameter(
            "propertyValueDate",
            Value::String(value.to_rfc3339_opts(SecondsFormat::Millis, true)),
        )
    }

    /// Date math comparison such as `now-7d`.
    pub fn property_date_expr(name: impl Into<String>, operator: &str, expr: &str) -> Self {
        Self::property_base(name, operator)
            .with_parameter("propertyValueDateExpr", Value::String(expr.to_string()))
    }

    /// Multi-valued comparison (`in`, `notIn`, `all`, `between`, ...). The
    /// slot is picked from the first value's JSON kind.
    pub fn property_values(name: impl Into<String>, operator: &str, values: Vec<Value>) -> Self {
        let slot = match values.first() {
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "propertyValuesInteger",
            Some(Value::Number(_)) => "propertyValuesDouble",
            _ => "propertyValues",
        };
        Self::property_base(name, operator).with_parameter(slot, Value::Array(values))
    }

    fn property_base(name: impl Into<String>, operator: &str) -> Self {
        Self::new(PROPERTY_CONDITION)
            .with_parameter("propertyName", Value::String(name.into()))
            .with_parameter("comparisonOperator", Value::String(operator.to_string()))
    }

    pub fn nested(path: impl Into<String>, sub: Condition) -> Self {
        Self::new(NESTED_CONDITION)
            .with_parameter("path", Value::String(path.into()))
            .with_parameter("subCondition", sub)
    }

    pub fn ids(ids: &[&str], matching: bool) -> Self {
        Self::new(IDS_CONDITION)
            .with_parameter(
                "ids",
                Value::Array(ids.iter().map(|s| Value::String(s.to_string())).collect()),
            )
            .with_parameter("match", Value::Bool(matching))
    }

    pub fn event_type(event_type: impl Into<String>) -> Self {
        Self::new(EVENT_TYPE_CONDITION).with_parameter("eventTypeId", Value::String(event_type.into()))
    }
}

/// Compact rendering for log lines, e.g.
/// `booleanCondition(operator=and, subConditions=[...])`.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.type_id)?;
        for (i, (name, value)) in self.parameter_values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                ParameterValue::Scalar(Value::String(s)) => write!(f, "{}={}", name, s)?,
                ParameterValue::Scalar(v) => write!(f, "{}={}", name, v)?,
                ParameterValue::Condition(c) => write!(f, "{}={}", name, c)?,
                ParameterValue::Conditions(cs) => {
                    write!(f, "{}=[", name)?;
                    for (j, c) in cs.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", c)?;
                    }
                    write!(f, "]")?;
                }
            }
        }
        write!(f, ")")
    }
}
