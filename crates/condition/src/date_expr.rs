//! Date math: `now`, `now-7d`, `now+1h/d`, `2024-01-01||+1M`, or a plain
//! timestamp. Units: `y`, `M`, `w`, `d`, `h`/`H`, `m`, `s`.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};

use crate::value::parse_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl Unit {
    fn parse(c: char) -> Option<Unit> {
        Some(match c {
            'y' => Unit::Year,
            'M' => Unit::Month,
            'w' => Unit::Week,
            'd' => Unit::Day,
            'h' | 'H' => Unit::Hour,
            'm' => Unit::Minute,
            's' => Unit::Second,
            _ => return None,
        })
    }
}

/// Resolve a date expression against `now`. `None` if it is malformed.
pub fn resolve(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expr = expr.trim();
    let (anchor, ops) = if let Some(rest) = expr.strip_prefix("now") {
        (now, rest)
    } else if let Some((date, rest)) = expr.split_once("||") {
        (parse_date(date)?, rest)
    } else {
        return parse_date(expr);
    };
    apply_ops(anchor, ops)
}

fn apply_ops(mut t: DateTime<Utc>, ops: &str) -> Option<DateTime<Utc>> {
    let chars: Vec<char> = ops.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '/' => {
                let unit = Unit::parse(*chars.get(i + 1)?)?;
                t = round_down(t, unit)?;
                i += 2;
            }
            sign @ ('+' | '-') => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let amount: i64 = if start == i {
                    1
                } else {
                    chars[start..i].iter().collect::<String>().parse().ok()?
                };
                let unit = Unit::parse(*chars.get(i)?)?;
                i += 1;
                let amount = if sign == '-' { -amount } else { amount };
                t = shift(t, amount, unit)?;
            }
            _ => return None,
        }
    }
    Some(t)
}

fn shift(t: DateTime<Utc>, amount: i64, unit: Unit) -> Option<DateTime<Utc>> {
    match unit {
        Unit::Year => shift_months(t, amount.checked_mul(12)?),
        Unit::Month => shift_months(t, amount),
        Unit::Week => t.checked_add_signed(Duration::try_weeks(amount)?),
        Unit::Day => t.checked_add_signed(Duration::try_days(amount)?),
        Unit::Hour => t.checked_add_signed(Duration::try_hours(amount)?),
        Unit::Minute => t.checked_add_signed(Duration::try_minutes(amount)?),
        Unit::Second => t.checked_add_signed(Duration::try_seconds(amount)?),
    }
}

fn shift_months(t: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let m = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        t.checked_add_months(m)
    } else {
        t.checked_sub_months(m)
    }
}

fn round_down(t: DateTime<Utc>, unit: Unit) -> Option<DateTime<Utc>> {
    let day_start = |d: NaiveDate| d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    match unit {
        Unit::Year => day_start(NaiveDate::from_ymd_opt(t.year(), 1, 1)?),
        Unit::Month => day_start(NaiveDate::from_ymd_opt(t.year(), t.month(), 1)?),
        Unit::Week => {
            let back = i64::from(t.weekday().num_days_from_monday());
            day_start(t.date_naive() - Duration::days(back))
        }
        Unit::Day => day_start(t.date_naive()),
        Unit::Hour => t.with_nanosecond(0)?.with_second(0)?.with_minute(0),
        Unit::Minute => t.with_nanosecond(0)?.with_second(0),
        Unit::Second => t.with_nanosecond(0),
    }
}
