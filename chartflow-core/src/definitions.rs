//! Source definitions: which symbols to ingest and how often.
//!
//! The definition list is a JSON array stored at `{prefix}/definitions.json`:
//!
//! ```json
//! [{"key": "spy_change", "symbol": "SPY", "frequency": "1D"}]
//! ```

use crate::error::{IngestError, Result};
use crate::layout::StorageLayout;
use crate::store::ObjectStore;
use chrono::Duration;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

/// One ingested data series.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDefinition {
    /// Case-insensitive identifier of the series.
    pub key: String,
    /// Symbol passed to the chart API.
    pub symbol: String,
    /// Minimum time between two ingestions.
    #[serde(deserialize_with = "deserialize_frequency")]
    pub frequency: Duration,
}

impl SourceDefinition {
    /// Lowercase form used in raw storage paths.
    pub fn storage_key(&self) -> String {
        self.key.to_lowercase()
    }

    /// Uppercase form used as the data tag.
    pub fn tag(&self) -> String {
        self.key.to_uppercase()
    }
}

fn deserialize_frequency<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_frequency(&raw).map_err(serde::de::Error::custom)
}

/// Parse the JSON definition list. Any missing field is an error.
pub fn parse_definitions(bytes: &[u8]) -> Result<Vec<SourceDefinition>> {
    let definitions: Vec<SourceDefinition> = serde_json::from_slice(bytes)
        .map_err(|e| IngestError::Configuration(format!("malformed definitions: {e}")))?;

    let mut seen = HashSet::new();
    for def in &definitions {
        if def.key.trim().is_empty() {
            return Err(IngestError::Configuration("definition with empty key".into()));
        }
        if def.key.contains('/') {
            return Err(IngestError::Configuration(format!(
                "definition key '{}' must not contain '/'",
                def.key
            )));
        }
        if def.key == "." || def.key == ".." {
            return Err(IngestError::Configuration(format!(
                "definition key '{}' is not a valid path segment",
                def.key
            )));
        }
        if def.symbol.trim().is_empty() {
            return Err(IngestError::Configuration(format!(
                "definition '{}' has an empty symbol",
                def.key
            )));
        }
        if !seen.insert(def.storage_key()) {
            return Err(IngestError::Configuration(format!(
                "duplicate definition key '{}'",
                def.key
            )));
        }
    }

    Ok(definitions)
}

/// Load and validate the definition list from storage.
pub fn load_definitions(
    store: &dyn ObjectStore,
    layout: &StorageLayout,
) -> Result<Vec<SourceDefinition>> {
    let key = layout.definitions_key();
    let bytes = store.get(&key).map_err(|e| match e {
        IngestError::ObjectNotFound { key } => {
            IngestError::Configuration(format!("definition list '{key}' does not exist"))
        }
        other => other,
    })?;
    parse_definitions(&bytes)
}

// ── Frequency parsing ───────────────────────────────────────────────

/// Parse a timedelta-style frequency.
///
/// Accepts compound `<number><unit>` tokens with optional whitespace
/// (`1D`, `12h`, `1 day 6 hours`, `1h30min`, `2w`) and ISO-8601 durations
/// without calendar components (`P1D`, `PT12H`, `P1DT6H`).
pub fn parse_frequency(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty frequency".into());
    }
    if s.starts_with('P') || s.starts_with('p') {
        return parse_iso8601(s);
    }

    let mut total = Duration::zero();
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(format!("expected a number in frequency '{input}'"));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("invalid number in frequency '{input}'"))?;
        rest = rest[number_end..].trim_start();

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = rest[unit_end..].trim_start();

        let seconds = unit_seconds(unit)
            .ok_or_else(|| format!("unknown unit '{unit}' in frequency '{input}'"))?;
        total = accumulate(total, value * seconds as f64, input)?;
    }
    Ok(total)
}

fn unit_seconds(unit: &str) -> Option<i64> {
    // "M" alone is ambiguous; pandas reads it as minutes in timedelta strings.
    let seconds = match unit {
        "W" | "w" | "week" | "weeks" => 7 * 86_400,
        "D" | "d" | "day" | "days" => 86_400,
        "H" | "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "T" | "m" | "M" | "min" | "mins" | "minute" | "minutes" => 60,
        "S" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        _ => return None,
    };
    Some(seconds)
}

/// Add `seconds` to `total`, rejecting values a duration cannot hold.
fn accumulate(
    total: Duration,
    seconds: f64,
    input: &str,
) -> std::result::Result<Duration, String> {
    let millis = (seconds * 1_000.0).round();
    let too_large = || format!("frequency '{input}' is too large");
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return Err(too_large());
    }
    Duration::try_milliseconds(millis as i64)
        .and_then(|d| total.checked_add(&d))
        .ok_or_else(too_large)
}

fn parse_iso8601(input: &str) -> std::result::Result<Duration, String> {
    let body = &input[1..];
    let (date_part, time_part) = match body.find(['T', 't']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let mut total = Duration::zero();
    let mut any = false;

    for (value, designator) in iso_components(date_part, input)? {
        let seconds = match designator {
            'W' => 7 * 86_400,
            'D' => 86_400,
            'Y' | 'M' => {
                return Err(format!(
                    "calendar units are not supported in frequency '{input}'"
                ))
            }
            other => return Err(format!("unknown designator '{other}' in '{input}'")),
        };
        total = accumulate(total, value * seconds as f64, input)?;
        any = true;
    }

    if let Some(time_part) = time_part {
        for (value, designator) in iso_components(time_part, input)? {
            let seconds = match designator {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                other => return Err(format!("unknown designator '{other}' in '{input}'")),
            };
            total = accumulate(total, value * seconds as f64, input)?;
            any = true;
        }
    }

    if !any {
        return Err(format!("ISO-8601 duration '{input}' has no components"));
    }
    Ok(total)
}

fn iso_components(part: &str, input: &str) -> std::result::Result<Vec<(f64, char)>, String> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
        } else {
            if number.is_empty() {
                return Err(format!("missing number before '{c}' in '{input}'"));
            }
            let value: f64 = number
                .parse()
                .map_err(|_| format!("invalid number in '{input}'"))?;
            out.push((value, c.to_ascii_uppercase()));
            number.clear();
        }
    }
    if !number.is_empty() {
        return Err(format!("trailing number without designator in '{input}'"));
    }
    Ok(out)
}
