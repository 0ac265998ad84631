//! Query DSL interpreter for the in-memory store.
//!
//! Field comparisons go through `cdp_condition::value`, the same code the
//! in-memory condition evaluator uses.

use std::cmp::Ordering;

use cdp_condition::value::{
    anchored_regex, compare, date_of, equals, text_of, values_at, wildcard_match, Operand,
};
use serde_json::{Map, Value};

use crate::backend::BackendError;

/// A stored document as seen by the interpreter.
pub(crate) struct DocRef<'a> {
    pub id: &'a str,
    pub source: &'a Value,
}

fn protocol(msg: impl Into<String>) -> BackendError {
    BackendError::Protocol(msg.into())
}

/// Single-key clause object `{kind: body}`.
fn single_entry(clause: &Value) -> Result<(&str, &Value), BackendError> {
    let obj = clause
        .as_object()
        .ok_or_else(|| protocol(format!("query clause is not an object: {}", clause)))?;
    if obj.len() != 1 {
        return Err(protocol(format!("query clause must have exactly one key: {}", clause)));
    }
    let (k, v) = obj.iter().next().ok_or_else(|| protocol("empty query clause"))?;
    Ok((k.as_str(), v))
}

/// `{field: value}` or `{field: {"value": value, ...}}`.
fn field_and_value<'a>(body: &'a Value, kind: &str) -> Result<(&'a str, &'a Value), BackendError> {
    let (field, v) = single_entry(body).map_err(|_| protocol(format!("malformed {} clause", kind)))?;
    match v {
        Value::Object(o) => o
            .get("value")
            .map(|inner| (field, inner))
            .ok_or_else(|| protocol(format!("{} clause without value", kind))),
        other => Ok((field, other)),
    }
}

fn clause_list(body: &Map<String, Value>, key: &str) -> Vec<Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    }
}

pub(crate) fn matches(query: &Value, doc: &DocRef<'_>) -> Result<bool, BackendError> {
    let (kind, body) = single_entry(query)?;
    match kind {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "bool" => bool_query(body, doc),
        "term" => {
            let (field, v) = field_and_value(body, "term")?;
            let operand = Operand::from_json(v).ok_or_else(|| protocol("term value must be a scalar"))?;
            Ok(field_equals(doc, field, &operand))
        }
        "terms" => {
            let (field, v) = single_entry(body)?;
            let values = v.as_array().ok_or_else(|| protocol("terms value must be an array"))?;
            Ok(values
                .iter()
                .filter_map(Operand::from_json)
                .any(|o| field_equals(doc, field, &o)))
        }
        "range" => range(body, doc),
        "prefix" => {
            let (field, v) = field_and_value(body, "prefix")?;
            let prefix = text_of(v).unwrap_or_default();
            Ok(any_text(doc, field, |t| t.starts_with(prefix.as_str())))
        }
        "wildcard" => {
            let (field, v) = field_and_value(body, "wildcard")?;
            let pattern = text_of(v).unwrap_or_default();
            Ok(any_text(doc, field, |t| wildcard_match(&pattern, t)))
        }
        "regexp" => {
            let (field, v) = field_and_value(body, "regexp")?;
            let pattern = text_of(v).unwrap_or_default();
            let re = anchored_regex(&pattern).map_err(|e| protocol(format!("invalid regexp: {}", e)))?;
            Ok(any_text(doc, field, |t| re.is_match(t)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| protocol("exists clause without field"))?;
            Ok(!values_at(doc.source, field).is_empty())
        }
        "ids" => {
            let values = body
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| protocol("ids clause without values"))?;
            Ok(values.iter().any(|v| v.as_str() == Some(doc.id)))
        }
        "nested" => nested(body, doc),
        other => Err(protocol(format!("unsupported query clause '{}'", other))),
    }
}

fn field_equals(doc: &DocRef<'_>, field: &str, operand: &Operand) -> bool {
    if field == "_id" {
        return Operand::Text(doc.id.to_string()) == *operand;
    }
    values_at(doc.source, field).iter().any(|v| equals(v, operand))
}

fn any_text(doc: &DocRef<'_>, field: &str, pred: impl Fn(&str) -> bool) -> bool {
    values_at(doc.source, field)
        .iter()
        .any(|v| text_of(v).map(|t| pred(t.as_str())).unwrap_or(false))
}

fn bool_query(body: &Value, doc: &DocRef<'_>) -> Result<bool, BackendError> {
    let body = body.as_object().ok_or_else(|| protocol("bool body must be an object"))?;
    let must = clause_list(body, "must");
    let filter = clause_list(body, "filter");
    let should = clause_list(body, "should");
    let must_not = clause_list(body, "must_not");

    for clause in must.iter().chain(filter.iter()) {
        if !matches(clause, doc)? {
            return Ok(false);
        }
    }
    for clause in &must_not {
        if matches(clause, doc)? {
            return Ok(false);
        }
    }

    let default_minimum = if !should.is_empty() && must.is_empty() && filter.is_empty() { 1 } else { 0 };
    let minimum = match body.get("minimum_should_match") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default_minimum),
        _ => default_minimum,
    };
    if minimum == 0 {
        return Ok(true);
    }
    let mut satisfied = 0;
    for clause in &should {
        if matches(clause, doc)? {
            satisfied += 1;
            if satisfied >= minimum {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn range(body: &Value, doc: &DocRef<'_>) -> Result<bool, BackendError> {
    let (field, spec) = single_entry(body)?;
    let spec = spec.as_object().ok_or_else(|| protocol("range spec must be an object"))?;
    let as_dates = spec.contains_key("format");

    let mut bounds: Vec<(Operand, fn(Ordering) -> bool)> = Vec::new();
    for (key, v) in spec {
        let accept: fn(Ordering) -> bool = match key.as_str() {
            "gt" => |o| o == Ordering::Greater,
            "gte" => |o| o != Ordering::Less,
            "lt" => |o| o == Ordering::Less,
            "lte" => |o| o != Ordering::Greater,
            "format" | "time_zone" | "boost" => continue,
            other => return Err(protocol(format!("unsupported range key '{}'", other))),
        };
        let operand = if as_dates {
            date_of(v)
                .map(Operand::Date)
                .ok_or_else(|| protocol(format!("unparseable date bound {}", v)))?
        } else {
            Operand::from_json(v).ok_or_else(|| protocol("range bound must be a scalar"))?
        };
        bounds.push((operand, accept));
    }

    Ok(values_at(doc.source, field).iter().any(|v| {
        bounds
            .iter()
            .all(|(operand, accept)| compare(v, operand).map(accept).unwrap_or(false))
    }))
}

/// Each object under `path` is matched on its own, with its fields at their
/// full dotted paths.
fn nested(body: &Value, doc: &DocRef<'_>) -> Result<bool, BackendError> {
    let path = body
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| protocol("nested clause without path"))?;
    let inner = body.get("query").ok_or_else(|| protocol("nested clause without query"))?;

    for object in values_at(doc.source, path) {
        if !object.is_object() {
            continue;
        }
        let mut scoped = object.clone();
        for segment in path.rsplit('.') {
            let mut wrapper = Map::new();
            wrapper.insert(segment.to_string(), scoped);
            scoped = Value::Object(wrapper);
        }
        let scoped_doc = DocRef {
            id: doc.id,
            source: &scoped,
        };
        if matches(inner, &scoped_doc)? {
            return Ok(true);
        }
    }
    Ok(false)
}
