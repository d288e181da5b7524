// src/utils/time.rs

//! Relative-time expressions and token expiry checks.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::models::QueryValue;

/// Days before token expiry at which a warning is logged.
const EXPIRY_WARNING_DAYS: i64 = 7;

/// Resolve a source's static query parameters into literal string pairs.
///
/// Relative-time values are dehumanized against the current UTC time;
/// unparseable expressions keep the literal value with a warning. Called at
/// job-registration time, matching the schedule-time contract.
pub fn resolve_query(query: &BTreeMap<String, QueryValue>) -> Vec<(String, String)> {
    let now = Utc::now();
    query
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(key, value, now)))
        .collect()
}

fn resolve_value(key: &str, value: &QueryValue, now: DateTime<Utc>) -> String {
    match value {
        QueryValue::Literal(v) => literal_to_string(v),
        QueryValue::Relative { value, format } => match dehumanize(value, now) {
            Some(ts) => format_timestamp(ts, format),
            None => {
                log::warn!("Could not dehumanize query parameter {key}: '{value}'");
                value.clone()
            }
        },
    }
}

fn literal_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a relative-time expression such as "3 days ago" or "now".
///
/// Months and years use calendar-free approximations (30 and 365 days).
pub fn dehumanize(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expr = expr.trim().to_ascii_lowercase();
    if expr == "now" {
        return Some(now);
    }

    let pattern = Regex::new(r"^(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago$")
        .expect("relative-time regex is valid");
    let caps = pattern.captures(&expr)?;
    let amount: i64 = caps[1].parse().ok()?;

    let span = match &caps[2] {
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" => Duration::weeks(amount),
        "month" => Duration::days(amount * 30),
        "year" => Duration::days(amount * 365),
        _ => return None,
    };
    Some(now - span)
}

/// Render a timestamp in the configured output format.
///
/// "ISO8601" renders RFC 3339; anything else is treated as a chrono
/// `strftime` format string.
pub fn format_timestamp(ts: DateTime<Utc>, format: &str) -> String {
    if format.eq_ignore_ascii_case("iso8601") {
        ts.to_rfc3339()
    } else {
        ts.format(format).to_string()
    }
}

/// Whole days remaining until a token expires (negative when already expired).
pub fn days_until(expires: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires - now).num_days()
}

/// Log a token-expiry warning for a technology scope when appropriate.
///
/// Called at registration and before each pass. Informational only; never
/// blocks scheduling. Scopes whose token is not close to expiry only log at
/// debug level to keep the per-pass output quiet.
pub fn warn_on_expiry(scope: &str, expires: Option<DateTime<Utc>>) {
    let Some(expires) = expires else {
        return;
    };
    let days = days_until(expires, Utc::now());
    if days <= EXPIRY_WARNING_DAYS {
        log::warn!("Token for {scope} expires in {days} day(s) ({expires})");
    } else {
        log::debug!("Token for {scope} expires in {days} day(s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_dehumanize_units() {
        let now = at("2026-08-05T12:00:00Z");
        assert_eq!(dehumanize("now", now), Some(now));
        assert_eq!(
            dehumanize("3 days ago", now),
            Some(at("2026-08-02T12:00:00Z"))
        );
        assert_eq!(
            dehumanize("1 hour ago", now),
            Some(at("2026-08-05T11:00:00Z"))
        );
        assert_eq!(
            dehumanize("2 weeks ago", now),
            Some(at("2026-07-22T12:00:00Z"))
        );
        assert_eq!(dehumanize("soonish", now), None);
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(ts, "ISO8601"), "2026-08-02T12:00:00+00:00");
        assert_eq!(format_timestamp(ts, "%Y-%m-%d"), "2026-08-02");
    }

    #[test]
    fn test_resolve_query_mixes_literal_and_relative() {
        let mut query = BTreeMap::new();
        query.insert(
            "limit".to_string(),
            QueryValue::Literal(serde_json::json!(100)),
        );
        query.insert(
            "since".to_string(),
            QueryValue::Relative {
                value: "1 day ago".into(),
                format: "%Y-%m-%d".into(),
            },
        );
        query.insert(
            "broken".to_string(),
            QueryValue::Relative {
                value: "whenever".into(),
                format: "ISO8601".into(),
            },
        );

        let resolved = resolve_query(&query);
        let lookup: BTreeMap<_, _> = resolved.into_iter().collect();
        assert_eq!(lookup["limit"], "100");
        assert_eq!(lookup["broken"], "whenever");
        assert_eq!(lookup["since"].len(), "2026-08-04".len());
    }

    #[test]
    fn test_days_until() {
        let now = at("2026-08-05T00:00:00Z");
        assert_eq!(days_until(at("2026-08-12T00:00:00Z"), now), 7);
        assert_eq!(days_until(at("2026-08-04T00:00:00Z"), now), -1);
    }
}
