//! Condition type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterType {
    String,
    Integer,
    Double,
    Date,
    Boolean,
    StringList,
    IntegerList,
    DoubleList,
    DateList,
    Condition,
    ConditionList,
}

impl ParameterType {
    pub fn is_list(self) -> bool {
        matches!(
            self,
            ParameterType::StringList
                | ParameterType::IntegerList
                | ParameterType::DoubleList
                | ParameterType::DateList
                | ParameterType::ConditionList
        )
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Double => "double",
            ParameterType::Date => "date",
            ParameterType::Boolean => "boolean",
            ParameterType::StringList => "stringList",
            ParameterType::IntegerList => "integerList",
            ParameterType::DoubleList => "doubleList",
            ParameterType::DateList => "dateList",
            ParameterType::Condition => "condition",
            ParameterType::ConditionList => "conditionList",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub id: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
}

/// Registration record for a condition type.
///
/// `evaluator` is optional: a type without one can only be compiled into a
/// backend query, never tested in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionType {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    pub query_builder: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
}

impl ConditionType {
    pub fn parameter(&self, id: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.id == id)
    }
}

impl PartialEq for ConditionType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConditionType {}
