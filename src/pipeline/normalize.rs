//! Normalization boundary for dynamic upstream event shapes
//!
//! Field names vary across upstream payload variants (`fee` vs `feeUSDC`,
//! `timestamp` vs `t`). All of that variance is isolated here: every logical
//! field is read through an ordered candidate list, and the rest of the
//! pipeline only sees typed values.

use super::types::Category;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Read a numeric field, trying each candidate key in order.
///
/// Accepts JSON numbers and numeric strings (the upstream mixes both).
/// Returns 0.0 when no candidate yields a finite number.
pub fn num_field(event: &Value, candidates: &[&str]) -> f64 {
    for key in candidates {
        match event.get(key) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_f64() {
                    if v.is_finite() {
                        return v;
                    }
                }
            }
            Some(Value::String(s)) => {
                if let Ok(v) = s.parse::<f64>() {
                    if v.is_finite() {
                        return v;
                    }
                }
            }
            _ => {}
        }
    }
    0.0
}

/// Read a string field, trying each candidate key in order.
///
/// Numbers are stringified so numeric ids can serve as dedup keys.
pub fn str_field(event: &Value, candidates: &[&str]) -> Option<String> {
    for key in candidates {
        match event.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Event timestamp from millisecond-epoch candidates (`timestamp`, `t`, `time`).
///
/// Missing or non-positive values fall back to the current instant, matching
/// the upstream contract that every event is stamped at ingestion time at the
/// latest.
pub fn event_timestamp(event: &Value) -> DateTime<Utc> {
    let ms = num_field(event, &["timestamp", "t", "time"]) as i64;
    if ms > 0 {
        if let Some(ts) = Utc.timestamp_millis_opt(ms).single() {
            return ts;
        }
    }
    Utc::now()
}

/// Classify a free-text ledger-transfer type into a ledger category.
///
/// Case-insensitive substring match: "deposit" wins over "withdraw";
/// anything else is `Other`.
pub fn classify_transfer(type_text: &str) -> Category {
    let lower = type_text.to_lowercase();
    if lower.contains("deposit") {
        Category::Deposit
    } else if lower.contains("withdraw") {
        Category::Withdrawal
    } else {
        Category::Other
    }
}
