//! Aggregation interpreter for the in-memory store: `global`, `filter`,
//! `terms`, `date_histogram` and `missing`, nested arbitrarily.

use std::collections::{BTreeMap, HashMap};

use cdp_condition::value::{date_of, format_date, text_of, values_at};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde_json::{json, Map, Value};

use super::query::{matches, DocRef};
use crate::backend::BackendError;

fn protocol(msg: impl Into<String>) -> BackendError {
    BackendError::Protocol(msg.into())
}

/// Evaluate an `aggs` object. `docs` are the query matches; `all` is every
/// document of the searched indices (the `global` scope).
pub(crate) fn run(spec: &Value, docs: &[DocRef<'_>], all: &[DocRef<'_>]) -> Result<Value, BackendError> {
    let spec = spec.as_object().ok_or_else(|| protocol("aggs must be an object"))?;
    let mut out = Map::new();
    for (name, agg) in spec {
        out.insert(name.clone(), run_one(agg, docs, all)?);
    }
    Ok(Value::Object(out))
}

fn run_one(agg: &Value, docs: &[DocRef<'_>], all: &[DocRef<'_>]) -> Result<Value, BackendError> {
    let obj = agg.as_object().ok_or_else(|| protocol("aggregation must be an object"))?;
    let sub = obj.get("aggs").or_else(|| obj.get("aggregations"));
    let kind = obj
        .iter()
        .find(|(k, _)| k.as_str() != "aggs" && k.as_str() != "aggregations")
        .ok_or_else(|| protocol("aggregation without a type"))?;

    match (kind.0.as_str(), kind.1) {
        ("global", _) => bucket(all, sub, all),
        ("filter", filter) => {
            let mut selected = Vec::new();
            for d in docs {
                if matches(filter, d)? {
                    selected.push(DocRef { id: d.id, source: d.source });
                }
            }
            bucket(&selected, sub, all)
        }
        ("missing", body) => {
            let field = field_of(body)?;
            let selected: Vec<DocRef<'_>> = docs
                .iter()
                .filter(|d| values_at(d.source, field).is_empty())
                .map(|d| DocRef { id: d.id, source: d.source })
                .collect();
            bucket(&selected, sub, all)
        }
        ("terms", body) => terms(body, docs, sub, all),
        ("date_histogram", body) => date_histogram(body, docs, sub, all),
        (other, _) => Err(protocol(format!("unsupported aggregation '{}'", other))),
    }
}

fn field_of(body: &Value) -> Result<&str, BackendError> {
    body.get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| protocol("aggregation without field"))
}

/// Single-bucket result: `doc_count` plus sub-aggregations.
fn bucket(docs: &[DocRef<'_>], sub: Option<&Value>, all: &[DocRef<'_>]) -> Result<Value, BackendError> {
    let mut out = Map::new();
    out.insert("doc_count".to_string(), json!(docs.len()));
    if let Some(sub) = sub {
        if let Value::Object(results) = run(sub, docs, all)? {
            out.extend(results);
        }
    }
    Ok(Value::Object(out))
}

fn terms(body: &Value, docs: &[DocRef<'_>], sub: Option<&Value>, all: &[DocRef<'_>]) -> Result<Value, BackendError> {
    let field = field_of(body)?;
    let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, d) in docs.iter().enumerate() {
        let mut keys: Vec<String> = values_at(d.source, field).into_iter().filter_map(text_of).collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            groups.entry(key).or_default().push(i);
        }
    }

    let mut ordered: Vec<(String, Vec<usize>)> = groups.into_iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
    let other: usize = ordered.iter().skip(size).map(|(_, members)| members.len()).sum();

    let mut buckets = Vec::new();
    for (key, members) in ordered.into_iter().take(size) {
        let selected: Vec<DocRef<'_>> = members
            .iter()
            .map(|&i| DocRef { id: docs[i].id, source: docs[i].source })
            .collect();
        let mut b = bucket(&selected, sub, all)?;
        if let Value::Object(m) = &mut b {
            m.insert("key".to_string(), Value::String(key));
        }
        buckets.push(b);
    }
    Ok(json!({"doc_count_error_upper_bound": 0, "sum_other_doc_count": other, "buckets": buckets}))
}

#[derive(Debug, Clone, Copy)]
enum Interval {
    Day,
    Week,
    Month,
    Year,
}

impl Interval {
    fn parse(raw: &str) -> Option<Interval> {
        Some(match raw {
            "day" | "1d" => Interval::Day,
            "week" | "1w" => Interval::Week,
            "month" | "1M" => Interval::Month,
            "year" | "1y" => Interval::Year,
            _ => return None,
        })
    }

    fn floor(self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = t.date_naive();
        let start = match self {
            Interval::Day => date,
            Interval::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Interval::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
            Interval::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
        };
        start.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
    }
}

fn date_histogram(
    body: &Value,
    docs: &[DocRef<'_>],
    sub: Option<&Value>,
    all: &[DocRef<'_>],
) -> Result<Value, BackendError> {
    let field = field_of(body)?;
    let raw = body
        .get("calendar_interval")
        .or_else(|| body.get("interval"))
        .and_then(Value::as_str)
        .ok_or_else(|| protocol("date_histogram without calendar_interval"))?;
    let interval = Interval::parse(raw).ok_or_else(|| protocol(format!("unsupported interval '{}'", raw)))?;

    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, d) in docs.iter().enumerate() {
        let mut keys: Vec<i64> = values_at(d.source, field)
            .into_iter()
            .filter_map(date_of)
            .filter_map(|t| interval.floor(t))
            .map(|t| t.timestamp_millis())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            groups.entry(key).or_default().push(i);
        }
    }

    let mut buckets = Vec::new();
    for (key, members) in groups {
        let selected: Vec<DocRef<'_>> = members
            .iter()
            .map(|&i| DocRef { id: docs[i].id, source: docs[i].source })
            .collect();
        let mut b = bucket(&selected, sub, all)?;
        if let Value::Object(m) = &mut b {
            m.insert("key".to_string(), json!(key));
            if let Some(t) = Utc.timestamp_millis_opt(key).single() {
                m.insert("key_as_string".to_string(), Value::String(format_date(&t)));
            }
        }
        buckets.push(b);
    }
    Ok(json!({"buckets": buckets}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_order_by_count_then_key() {
        let sources = [
            json!({"c": "b"}),
            json!({"c": "a"}),
            json!({"c": ["b", "b"]}),
            json!({"c": "z"}),
            json!({}),
        ];
        let docs: Vec<DocRef<'_>> = sources.iter().map(|s| DocRef { id: "x", source: s }).collect();
        let out = run(&json!({"t": {"terms": {"field": "c", "size": 2}}}), &docs, &docs).unwrap();
        assert_eq!(out["t"]["buckets"][0]["key"], "b");
        assert_eq!(out["t"]["buckets"][0]["doc_count"], 2);
        assert_eq!(out["t"]["buckets"][1]["key"], "a");
        assert_eq!(out["t"]["sum_other_doc_count"], 1);
    }

    #[test]
    fn global_ignores_query_scope() {
        let sources = [json!({"k": 1}), json!({"k": 2})];
        let all: Vec<DocRef<'_>> = sources.iter().map(|s| DocRef { id: "x", source: s }).collect();
        let matched = vec![DocRef { id: "x", source: &sources[0] }];
        let out = run(
            &json!({"g": {"global": {}, "aggs": {"m": {"missing": {"field": "nope"}}}}}),
            &matched,
            &all,
        )
        .unwrap();
        assert_eq!(out["g"]["doc_count"], 2);
        assert_eq!(out["g"]["m"]["doc_count"], 2);
    }

    #[test]
    fn date_histogram_buckets_by_week_start() {
        let sources = [
            json!({"t": "2024-03-13T10:00:00Z"}),
            json!({"t": "2024-03-11T00:00:00Z"}),
            json!({"t": "2024-03-18T00:00:00Z"}),
        ];
        let docs: Vec<DocRef<'_>> = sources.iter().map(|s| DocRef { id: "x", source: s }).collect();
        let out = run(
            &json!({"h": {"date_histogram": {"field": "t", "calendar_interval": "week"}}}),
            &docs,
            &docs,
        )
        .unwrap();
        let buckets = out["h"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0]["key_as_string"], "2024-03-11T00:00:00.000Z");
        assert_eq!(buckets[0]["doc_count"], 2);
    }
}
