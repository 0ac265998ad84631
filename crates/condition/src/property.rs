//! Property comparison parsing shared by the property evaluator and the
//! property query builder.

use std::fmt;
use std::str::FromStr;

use cdp_core::{CdpError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::condition::Condition;
use crate::date_expr;
use crate::value::{self, date_of, number_of, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Between,
    Exists,
    Missing,
    Contains,
    StartsWith,
    EndsWith,
    MatchesRegex,
    In,
    NotIn,
    All,
    InContains,
}

impl FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "equals" => Self::Equals,
            "notEquals" => Self::NotEquals,
            "greaterThan" => Self::GreaterThan,
            "greaterThanOrEqualTo" => Self::GreaterThanOrEqualTo,
            "lessThan" => Self::LessThan,
            "lessThanOrEqualTo" => Self::LessThanOrEqualTo,
            "between" => Self::Between,
            "exists" => Self::Exists,
            "missing" => Self::Missing,
            "contains" => Self::Contains,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "matchesRegex" => Self::MatchesRegex,
            "in" | "hasSomeOf" => Self::In,
            "notIn" | "hasNoneOf" => Self::NotIn,
            "all" => Self::All,
            "inContains" => Self::InContains,
            other => return Err(format!("unknown comparison operator '{}'", other)),
        })
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqualTo => "lessThanOrEqualTo",
            Self::Between => "between",
            Self::Exists => "exists",
            Self::Missing => "missing",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::MatchesRegex => "matchesRegex",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::All => "all",
            Self::InContains => "inContains",
        };
        write!(f, "{}", s)
    }
}

impl ComparisonOperator {
    fn takes_list(self) -> bool {
        matches!(
            self,
            Self::Between | Self::In | Self::NotIn | Self::All | Self::InContains
        )
    }

    fn takes_nothing(self) -> bool {
        matches!(self, Self::Exists | Self::Missing)
    }

    fn is_textual(self) -> bool {
        matches!(
            self,
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::MatchesRegex | Self::InContains
        )
    }
}

/// Value slots, most specific first.
const SINGLE_SLOTS: &[(&str, Slot)] = &[
    ("propertyValueDateExpr", Slot::DateExpr),
    ("propertyValueDate", Slot::Date),
    ("propertyValueInteger", Slot::Number),
    ("propertyValueDouble", Slot::Number),
    ("propertyValue", Slot::Plain),
];

const LIST_SLOTS: &[(&str, Slot)] = &[
    ("propertyValuesDateExpr", Slot::DateExpr),
    ("propertyValuesDate", Slot::Date),
    ("propertyValuesInteger", Slot::Number),
    ("propertyValuesDouble", Slot::Number),
    ("propertyValues", Slot::Plain),
];

#[derive(Debug, Clone, Copy)]
enum Slot {
    DateExpr,
    Date,
    Number,
    Plain,
}

impl Slot {
    fn operand(self, v: &Value, now: DateTime<Utc>) -> Option<Operand> {
        match self {
            Slot::DateExpr => v.as_str().and_then(|s| date_expr::resolve(s, now)).map(Operand::Date),
            Slot::Date => date_of(v).map(Operand::Date),
            Slot::Number => number_of(v).map(Operand::Number),
            Slot::Plain => Operand::from_json(v),
        }
    }
}

/// A parsed property comparison: field, operator and typed operands.
#[derive(Debug, Clone)]
pub struct PropertyComparison {
    pub field: String,
    pub operator: ComparisonOperator,
    /// Operands in parameter order. Empty for `exists`/`missing`, one value
    /// for scalar operators, two for `between`.
    pub operands: Vec<Operand>,
    /// Compiled anchored pattern for `matchesRegex`.
    pub regex: Option<Regex>,
}

impl PropertyComparison {
    /// Parse a property condition. Date expressions resolve against `now`.
    pub fn from_condition(condition: &Condition, now: DateTime<Utc>) -> Result<Self> {
        let type_id = condition.type_id();
        let field = condition
            .string("propertyName")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CdpError::invalid_condition(type_id, "missing propertyName"))?
            .to_string();
        let operator: ComparisonOperator = condition
            .string("comparisonOperator")
            .ok_or_else(|| CdpError::invalid_condition(type_id, "missing comparisonOperator"))?
            .parse()
            .map_err(|e: String| CdpError::invalid_condition(type_id, e))?;

        let operands = if operator.takes_nothing() {
            Vec::new()
        } else if operator.takes_list() {
            match list_operands(condition, now)? {
                Some(list) => list,
                None => single_operand(condition, now)?
                    .map(|o| vec![o])
                    .ok_or_else(|| {
                        CdpError::invalid_condition(type_id, format!("{} needs a list of values", operator))
                    })?,
            }
        } else {
            let single = single_operand(condition, now)?.ok_or_else(|| {
                CdpError::invalid_condition(type_id, format!("{} needs a value", operator))
            })?;
            vec![single]
        };

        if operator == ComparisonOperator::Between && operands.len() != 2 {
            return Err(CdpError::invalid_condition(
                type_id,
                format!("between needs exactly two values, got {}", operands.len()),
            ));
        }

        let operands = if operator.is_textual() {
            operands.into_iter().map(|o| Operand::Text(o.as_text())).collect()
        } else {
            operands
        };

        let regex = if operator == ComparisonOperator::MatchesRegex {
            let pattern = operands.first().map(Operand::as_text).unwrap_or_default();
            Some(value::anchored_regex(&pattern).map_err(|e| {
                CdpError::invalid_condition(type_id, format!("invalid regex '{}': {}", pattern, e))
            })?)
        } else {
            None
        };

        Ok(Self {
            field,
            operator,
            operands,
            regex,
        })
    }

    /// The single operand of scalar operators.
    pub fn operand(&self) -> Option<&Operand> {
        self.operands.first()
    }
}

fn single_operand(condition: &Condition, now: DateTime<Utc>) -> Result<Option<Operand>> {
    for (name, slot) in SINGLE_SLOTS {
        if let Some(v) = condition.scalar(name) {
            let operand = slot.operand(v, now).ok_or_else(|| {
                CdpError::invalid_condition(condition.type_id(), format!("unusable value for {}: {}", name, v))
            })?;
            return Ok(Some(operand));
        }
    }
    Ok(None)
}

fn list_operands(condition: &Condition, now: DateTime<Utc>) -> Result<Option<Vec<Operand>>> {
    for (name, slot) in LIST_SLOTS {
        if let Some(values) = condition.scalar_list(name) {
            let mut operands = Vec::with_capacity(values.len());
            for v in values {
                operands.push(slot.operand(v, now).ok_or_else(|| {
                    CdpError::invalid_condition(
                        condition.type_id(),
                        format!("unusable value in {}: {}", name, v),
                    )
                })?);
            }
            return Ok(Some(operands));
        }
    }
    Ok(None)
}
