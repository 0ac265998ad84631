//! Structural validation of condition trees against the registry.
//!
//! Returns a [`ValidationResult`] with errors (unusable tree) and warnings
//! (advisory, e.g. undeclared parameters). Locations are JSON-path-like,
//! e.g. `parameterValues.subConditions[1].parameterValues.operator`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{Condition, ParameterValue};
use crate::property::PropertyComparison;
use crate::registry::ConditionTypeRegistry;
use crate::types::{ConditionType, ParameterType};
use crate::value::date_of;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    fn error_with_suggestion(&mut self, path: impl Into<String>, message: impl Into<String>, suggestion: String) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a whole condition tree.
pub fn validate(registry: &ConditionTypeRegistry, condition: &Condition) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_node(registry, condition, "", &mut result);
    result
}

fn join(base: &str, suffix: &str) -> String {
    if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{}.{}", base, suffix)
    }
}

fn validate_node(registry: &ConditionTypeRegistry, condition: &Condition, path: &str, result: &mut ValidationResult) {
    let Some(condition_type) = registry.get(condition.type_id()) else {
        let type_path = join(path, "type");
        let message = format!("unknown condition type '{}'", condition.type_id());
        let ids = registry.ids();
        let candidates: Vec<&str> = ids.iter().map(String::as_str).collect();
        match fuzzy_match(condition.type_id(), &candidates) {
            Some(s) => result.error_with_suggestion(type_path, message, format!("Did you mean '{}'?", s)),
            None => result.error(type_path, message),
        }
        // Children are still checked so every problem surfaces at once.
        for (name, value) in condition.parameters() {
            validate_children(registry, value, &join(path, &format!("parameterValues.{}", name)), result);
        }
        return;
    };

    for (name, value) in condition.parameters() {
        let param_path = join(path, &format!("parameterValues.{}", name));
        match condition_type.parameter(name) {
            Some(def) => check_shape(def.param_type, value, &param_path, result),
            None => result.warn(
                &param_path,
                format!("parameter '{}' is not declared by '{}'", name, condition_type.id),
            ),
        }
        validate_children(registry, value, &param_path, result);
    }

    check_semantics(&condition_type, condition, path, result);
}

fn validate_children(registry: &ConditionTypeRegistry, value: &ParameterValue, path: &str, result: &mut ValidationResult) {
    match value {
        ParameterValue::Condition(c) => validate_node(registry, c, path, result),
        ParameterValue::Conditions(cs) => {
            for (i, c) in cs.iter().enumerate() {
                validate_node(registry, c, &format!("{}[{}]", path, i), result);
            }
        }
        ParameterValue::Scalar(_) => {}
    }
}

fn scalar_ok(param_type: ParameterType, v: &Value) -> bool {
    match param_type {
        ParameterType::String => v.is_string() || v.is_number() || v.is_boolean(),
        ParameterType::Integer => v.is_i64() || v.is_u64(),
        ParameterType::Double => v.is_number(),
        ParameterType::Date => date_of(v).is_some(),
        ParameterType::Boolean => v.is_boolean(),
        _ => false,
    }
}

fn element_type(list: ParameterType) -> Option<ParameterType> {
    match list {
        ParameterType::StringList => Some(ParameterType::String),
        ParameterType::IntegerList => Some(ParameterType::Integer),
        ParameterType::DoubleList => Some(ParameterType::Double),
        ParameterType::DateList => Some(ParameterType::Date),
        _ => None,
    }
}

fn check_shape(param_type: ParameterType, value: &ParameterValue, path: &str, result: &mut ValidationResult) {
    let ok = match (param_type, value) {
        (_, ParameterValue::Scalar(Value::Null)) => true,
        (ParameterType::Condition, ParameterValue::Condition(_)) => true,
        (ParameterType::ConditionList, ParameterValue::Conditions(_)) => true,
        (ParameterType::ConditionList, ParameterValue::Scalar(Value::Array(a))) => a.is_empty(),
        (list, ParameterValue::Conditions(cs)) if element_type(list).is_some() => cs.is_empty(),
        (list, ParameterValue::Scalar(Value::Array(items))) => match element_type(list) {
            Some(el) => {
                for (i, item) in items.iter().enumerate() {
                    if !scalar_ok(el, item) {
                        result.error(format!("{}[{}]", path, i), format!("expected {}", el));
                    }
                }
                true
            }
            None => false,
        },
        (scalar, ParameterValue::Scalar(v)) => {
            scalar_ok(scalar, v) || element_type(scalar).map(|el| scalar_ok(el, v)).unwrap_or(false)
        }
        _ => false,
    };
    if !ok {
        result.error(path, format!("expected {}", param_type));
    }
}

/// Checks that depend on what the type's builder needs.
fn check_semantics(condition_type: &ConditionType, condition: &Condition, path: &str, result: &mut ValidationResult) {
    match condition_type.query_builder.as_str() {
        "booleanConditionQueryBuilder" => {
            match condition.string("operator") {
                Some("and") | Some("or") | None => {}
                Some(other) => result.error(
                    join(path, "parameterValues.operator"),
                    format!("operator must be 'and' or 'or', got '{}'", other),
                ),
            }
            if condition.sub_conditions("subConditions").is_none() {
                result.error(join(path, "parameterValues.subConditions"), "missing subConditions");
            }
        }
        "notConditionQueryBuilder" => {
            if condition.sub_condition("subCondition").is_none() {
                result.error(join(path, "parameterValues.subCondition"), "missing subCondition");
            }
        }
        "nestedConditionQueryBuilder" => {
            if condition.string("path").is_none() {
                result.error(join(path, "parameterValues.path"), "missing path");
            }
            if condition.sub_condition("subCondition").is_none() {
                result.error(join(path, "parameterValues.subCondition"), "missing subCondition");
            }
        }
        "propertyConditionQueryBuilder" => {
            if let Err(e) = PropertyComparison::from_condition(condition, Utc::now()) {
                result.error(join(path, "parameterValues"), e.to_string());
            }
        }
        "idsConditionQueryBuilder" => {
            if condition.scalar_list("ids").is_none() {
                result.error(join(path, "parameterValues.ids"), "missing ids");
            }
        }
        "eventTypeConditionQueryBuilder" => {
            if condition.string("eventTypeId").is_none() {
                result.error(join(path, "parameterValues.eventTypeId"), "missing eventTypeId");
            }
        }
        _ => {}
    }
}

/// Closest candidate by edit distance, if reasonably close.
fn fuzzy_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input_lower = input.to_lowercase();
    let mut best: Option<(&str, usize)> = None;
    for &candidate in candidates {
        let dist = levenshtein(&input_lower, &candidate.to_lowercase());
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((candidate, dist)),
        }
    }
    best.and_then(|(name, dist)| {
        let max_len = input.len().max(name.len());
        (dist <= max_len / 2).then_some(name)
    })
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
