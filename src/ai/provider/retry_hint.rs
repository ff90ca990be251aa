//! Provider retry hints
//!
//! Providers report how long to wait in several shapes: Google's
//! `"retryDelay": "17s"` detail, protobuf-style `{seconds, nanos}` objects,
//! an HTTP `Retry-After` header in whole seconds, or free text such as
//! "Please retry in 1.5s". Anything unrecognized yields `None` and the retry
//! driver falls back to its backoff schedule.

use serde_json::Value;
use std::time::Duration;

use crate::constants::retry::MAX_RETRY_HINT_SECS;

/// Parse a retry delay from a JSON value (string, number or `{seconds, nanos}`)
pub fn parse_retry_delay(value: &Value) -> Option<Duration> {
    let delay = match value {
        Value::String(s) => parse_duration_str(s),
        Value::Number(n) => n.as_f64().and_then(seconds_to_duration),
        Value::Object(map) => {
            let seconds = map.get("seconds").and_then(json_number)?;
            let nanos = map.get("nanos").and_then(json_number).unwrap_or(0.0);
            seconds_to_duration(seconds + nanos / 1e9)
        }
        _ => None,
    }?;
    Some(clamp(delay))
}

/// Parse a `Retry-After` header value; HTTP dates are not supported
pub fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| clamp(Duration::from_secs(secs)))
}

/// Find "retry in N", "retry after N" or "try again in N" in a provider message
pub fn parse_retry_delay_from_message(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let idx = lower.find("retry").or_else(|| lower.find("try again"))?;

    lower[idx..]
        .split_whitespace()
        .skip(1)
        .take(4)
        .map(|word| word.trim_end_matches(['.', ',', ';', ')']))
        .find_map(parse_duration_str)
        .map(clamp)
}

/// `"17s"`, `"1.5s"`, `"500ms"`, `"2m"` or a bare number of seconds
fn parse_duration_str(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        let value: f64 = ms.trim().parse().ok()?;
        return seconds_to_duration(value / 1000.0);
    }

    let (number, unit_secs) = if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else {
        (s, 1.0)
    };

    let value: f64 = number.trim().parse().ok()?;
    seconds_to_duration(value * unit_secs)
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // protobuf JSON encodes int64 seconds as a string
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

fn clamp(delay: Duration) -> Duration {
    delay.min(Duration::from_secs(MAX_RETRY_HINT_SECS))
}
