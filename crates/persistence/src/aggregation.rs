//! Bucket aggregations over a type's documents, flattened to
//! `bucket key → count`.
//!
//! Request shape: `global` → optional `filter` → `buckets` (terms or date
//! histogram) with a sibling `missing` count.

use chrono::{Datelike, TimeZone, Utc};
use cdp_condition::value::text_of;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

pub const ALL_KEY: &str = "_all";
pub const FILTERED_KEY: &str = "_filtered";
pub const MISSING_KEY: &str = "_missing";

fn is_reserved(key: &str) -> bool {
    matches!(key, ALL_KEY | FILTERED_KEY | MISSING_KEY)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateInterval {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl DateInterval {
    fn calendar_interval(self) -> &'static str {
        match self {
            DateInterval::Day => "day",
            DateInterval::Week => "week",
            DateInterval::Month => "month",
            DateInterval::Year => "year",
        }
    }

    /// Bucket key for a bucket starting at `millis`.
    pub fn format_key(self, millis: i64) -> Option<String> {
        let start = Utc.timestamp_millis_opt(millis).single()?;
        Some(match self {
            DateInterval::Day | DateInterval::Week => start.format("%Y-%m-%d").to_string(),
            DateInterval::Month => start.format("%Y-%m").to_string(),
            DateInterval::Year => format!("{:04}", start.year()),
        })
    }
}

/// How matched documents are grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Aggregate {
    Terms {
        field: String,
    },
    Date {
        field: String,
        #[serde(default)]
        interval: DateInterval,
    },
}

impl Aggregate {
    pub fn terms(field: impl Into<String>) -> Self {
        Aggregate::Terms { field: field.into() }
    }

    pub fn date(field: impl Into<String>, interval: DateInterval) -> Self {
        Aggregate::Date {
            field: field.into(),
            interval,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Aggregate::Terms { field } | Aggregate::Date { field, .. } => field,
        }
    }

    fn bucket_aggs(&self, bucket_size: u32) -> Value {
        let buckets = match self {
            Aggregate::Terms { field } => json!({"terms": {"field": field, "size": bucket_size}}),
            Aggregate::Date { field, interval } => json!({"date_histogram": {
                "field": field,
                "calendar_interval": interval.calendar_interval(),
            }}),
        };
        json!({
            "buckets": buckets,
            "missing": {"missing": {"field": self.field()}},
        })
    }

    fn bucket_key(&self, bucket: &Value) -> Option<String> {
        match self {
            Aggregate::Terms { .. } => bucket.get("key").and_then(text_of),
            Aggregate::Date { interval, .. } => bucket
                .get("key")
                .and_then(Value::as_i64)
                .and_then(|ms| interval.format_key(ms)),
        }
    }
}

/// The `aggs` body for a search.
pub fn request(filter: Option<&Value>, aggregate: Option<&Aggregate>, bucket_size: u32) -> Value {
    let buckets = aggregate.map(|a| a.bucket_aggs(bucket_size));
    let inner = match (filter, buckets) {
        (Some(f), Some(b)) => Some(json!({"filter": {"filter": f, "aggs": b}})),
        (Some(f), None) => Some(json!({"filter": {"filter": f}})),
        (None, b) => b,
    };
    let mut global = Map::new();
    global.insert("global".to_string(), json!({}));
    if let Some(inner) = inner {
        global.insert("aggs".to_string(), inner);
    }
    json!({ "global": Value::Object(global) })
}

fn doc_count(v: &Value) -> u64 {
    v.get("doc_count").and_then(Value::as_u64).unwrap_or(0)
}

/// Flatten an aggregation response built by [`request`].
pub fn flatten(response: &Value, filtered: bool, aggregate: Option<&Aggregate>) -> IndexMap<String, u64> {
    let mut out = IndexMap::new();
    let global = &response["global"];
    out.insert(ALL_KEY.to_string(), doc_count(global));

    let scope = if filtered {
        let filter = &global["filter"];
        out.insert(FILTERED_KEY.to_string(), doc_count(filter));
        filter
    } else {
        global
    };

    let Some(aggregate) = aggregate else {
        return out;
    };
    if let Some(buckets) = scope["buckets"]["buckets"].as_array() {
        for bucket in buckets {
            let count = doc_count(bucket);
            if count == 0 {
                continue;
            }
            let Some(key) = aggregate.bucket_key(bucket) else {
                continue;
            };
            if is_reserved(&key) {
                warn!(field = aggregate.field(), key = %key, count, "bucket key collides with a reserved key, skipped");
                continue;
            }
            *out.entry(key).or_insert(0) += count;
        }
    }
    let missing = doc_count(&scope["missing"]);
    if missing > 0 {
        out.insert(MISSING_KEY.to_string(), missing);
    }
    out
}
