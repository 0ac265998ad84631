//! Value extraction and comparison shared by the in-memory evaluator and the
//! in-memory search backend, so both sides agree on what a match is.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::{Number, Value};

/// A typed comparison operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Bool(bool),
}

impl Operand {
    /// Operand from a plain JSON scalar. Arrays, objects and null yield `None`.
    pub fn from_json(v: &Value) -> Option<Operand> {
        match v {
            Value::String(s) => Some(Operand::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(Operand::Number),
            Value::Bool(b) => Some(Operand::Bool(*b)),
            _ => None,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Operand::Date(_))
    }

    /// Textual form used by string operators.
    pub fn as_text(&self) -> String {
        match self {
            Operand::Text(s) => s.clone(),
            Operand::Number(n) => format_number(*n),
            Operand::Date(d) => format_date(d),
            Operand::Bool(b) => b.to_string(),
        }
    }

    /// JSON form emitted into native queries. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Operand::Text(s) => Value::String(s.clone()),
            Operand::Number(n) => number_json(*n),
            Operand::Date(d) => Value::String(format_date(d)),
            Operand::Bool(b) => Value::Bool(*b),
        }
    }
}

/// RFC 3339 with millisecond precision and `Z` suffix.
pub fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_integral(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn number_json(n: f64) -> Value {
    if is_integral(n) {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// All non-null values at a dotted path. Arrays met along the way (and at
/// the end) are flattened.
pub fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for v in current {
            collect_field(v, segment, &mut next);
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    let mut out = Vec::new();
    for v in current {
        flatten_into(v, &mut out);
    }
    out
}

fn collect_field<'a>(v: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match v {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_field(item, segment, out);
            }
        }
        _ => {}
    }
}

fn flatten_into<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
    match v {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

/// Text form of a stored scalar. Objects have none.
pub fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if !(n.is_i64() || n.is_u64()) => format_number(f),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric form of a stored scalar; numeric strings are parsed.
pub fn number_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Date form of a stored scalar: RFC 3339/ISO strings (offsets honored),
/// naive timestamps taken as UTC, plain dates at midnight UTC, and epoch
/// milliseconds (number or digit string).
pub fn date_of(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_date(s),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(d) = DateTime::parse_from_str(s, fmt) {
            return Some(d.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(d.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        if let Ok(ms) = s.parse::<i64>() {
            return Utc.timestamp_millis_opt(ms).single();
        }
    }
    None
}

fn bool_of(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Order a stored element against an operand, coercing the element to the
/// operand's kind. `None` when the element cannot be coerced.
pub fn compare(element: &Value, operand: &Operand) -> Option<Ordering> {
    match operand {
        Operand::Number(n) => number_of(element)?.partial_cmp(n),
        Operand::Date(d) => Some(date_of(element)?.cmp(d)),
        Operand::Text(s) => Some(text_of(element)?.as_str().cmp(s.as_str())),
        Operand::Bool(b) => Some(bool_of(element)?.cmp(b)),
    }
}

pub fn equals(element: &Value, operand: &Operand) -> bool {
    compare(element, operand) == Some(Ordering::Equal)
}

/// Regex matching the whole value.
pub fn anchored_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

/// Escape `*`, `?` and `\` for use inside a wildcard pattern.
pub fn escape_wildcard(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Match a wildcard pattern (`*` any run, `?` one char, `\` escapes) against
/// the whole text.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => tokens.push(Token::Lit(chars.next().unwrap_or('\\'))),
            '*' => tokens.push(Token::Star),
            '?' => tokens.push(Token::One),
            other => tokens.push(Token::Lit(other)),
        }
    }
    let text: Vec<char> = text.chars().collect();

    // Iterative matcher with single-star backtracking.
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Lit(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            Some(Token::One) => {
                t += 1;
                p += 1;
            }
            Some(Token::Star) => {
                star = Some((p, t));
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|tok| matches!(tok, Token::Star))
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Lit(char),
    Star,
    One,
}
