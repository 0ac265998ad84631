//! Condition language for the CDP persistence engine.
//!
//! This crate provides:
//! - Typed, parameterized condition trees with builders
//! - A registry of condition types loaded from YAML definitions
//! - Tree validation with path-located errors
//! - In-memory evaluation against stored-form documents
//! - Compilation into OpenSearch query DSL

pub mod condition;
pub mod date_expr;
pub mod evaluator;
pub mod property;
pub mod query;
pub mod registry;
pub mod types;
pub mod validation;
pub mod value;

pub use condition::{Condition, ParameterValue};
pub use evaluator::{ConditionEvaluator, ConditionEvaluatorDispatcher};
pub use query::{ConditionQueryBuilder, QueryBuilderDispatcher};
pub use registry::ConditionTypeRegistry;
pub use types::{ConditionType, ParameterDef, ParameterType};
pub use validation::{validate, ValidationResult};
