//! Normalizer: one raw snapshot in, one typed processed artifact out.
//!
//! Each raw record is parsed field by field into a [`ProcessedRecord`]. A
//! missing or untypeable field rejects the whole snapshot; nothing is written
//! for a rejected snapshot.

use super::artifact::{encode_artifact, ProcessedRecord};
use crate::clock::daily_cutoff;
use crate::error::{IngestError, Result};
use crate::layout::{RawObjectKey, StorageLayout};
use crate::store::ObjectStore;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

const DATE_FIELD: &str = "date";
const CHANGE_FIELD: &str = "changePercent";
const VOLUME_FIELD: &str = "volume";

/// Build typed records from a raw chart body tagged with `source_key`.
pub fn parse_records(body: &[u8], source_key: &str) -> Result<Vec<ProcessedRecord>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| IngestError::InputValidation(format!("raw body is not JSON: {e}")))?;

    let Value::Array(rows) = value else {
        return Err(IngestError::InputValidation(format!(
            "raw body must be a JSON array of records, got {}",
            json_kind(&value)
        )));
    };

    if rows.is_empty() {
        return Err(IngestError::InputValidation(
            "raw body contains no records".into(),
        ));
    }

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let Value::Object(fields) = row else {
                return Err(IngestError::InputValidation(format!(
                    "record {i} is {}, expected an object",
                    json_kind(row)
                )));
            };
            build_record(fields, source_key)
                .map_err(|msg| IngestError::InputValidation(format!("record {i}: {msg}")))
        })
        .collect()
}

fn build_record(
    fields: &Map<String, Value>,
    source_key: &str,
) -> std::result::Result<ProcessedRecord, String> {
    let date = field(fields, DATE_FIELD).and_then(coerce_date)?;
    let percent_change = field(fields, CHANGE_FIELD).and_then(coerce_f64)?;
    let volume = field(fields, VOLUME_FIELD).and_then(coerce_i64)?;

    let timestamp =
        daily_cutoff(date).ok_or_else(|| format!("date {date} has no 17:00 local instant"))?;

    Ok(ProcessedRecord {
        timestamp,
        key: source_key.to_string(),
        percent_change,
        volume,
    })
}

fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> std::result::Result<&'a Value, String> {
    fields
        .get(name)
        .ok_or_else(|| format!("missing field '{name}'"))
}

fn coerce_date(value: &Value) -> std::result::Result<NaiveDate, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("'{DATE_FIELD}' must be a string, got {}", json_kind(value)))?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("'{DATE_FIELD}' value '{s}' is not YYYY-MM-DD: {e}"))
}

/// Numbers and numeric strings; null becomes NaN.
fn coerce_f64(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("'{CHANGE_FIELD}' value {n} is not a float")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{CHANGE_FIELD}' value '{s}' is not numeric")),
        other => Err(format!(
            "'{CHANGE_FIELD}' must be numeric, got {}",
            json_kind(other)
        )),
    }
}

/// Integers, integral floats, and integer strings. Null is rejected.
fn coerce_i64(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(format!("'{VOLUME_FIELD}' value {n} is not an integer")),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{VOLUME_FIELD}' value '{s}' is not an integer")),
        other => Err(format!(
            "'{VOLUME_FIELD}' must be an integer, got {}",
            json_kind(other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Normalizer ──────────────────────────────────────────────────────

/// What one normalization produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub raw_key: String,
    pub processed_key: String,
    pub rows: usize,
    /// blake3 of the artifact bytes.
    pub content_hash: String,
}

pub struct Normalizer {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
}

impl Normalizer {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    /// Normalize the raw snapshot stored at `raw_key`.
    ///
    /// The artifact reuses the snapshot's stamp, so re-running on the same
    /// snapshot rewrites identical bytes to the same key.
    pub fn normalize(&self, raw_key: &str) -> Result<NormalizeOutcome> {
        let parsed = RawObjectKey::parse(raw_key)?;
        let body = self.store.get(raw_key)?;

        let records = parse_records(&body, &parsed.source_key)?;
        let bytes = encode_artifact(&records)?;

        let processed_key = self.layout.processed_key(&parsed.source_key, &parsed.stamp);
        self.store.put(&processed_key, &bytes)?;

        let content_hash = blake3::hash(&bytes).to_hex().to_string();
        info!(
            raw = raw_key,
            processed = %processed_key,
            rows = records.len(),
            hash = %content_hash,
            "wrote processed artifact"
        );

        Ok(NormalizeOutcome {
            raw_key: raw_key.to_string(),
            processed_key,
            rows: records.len(),
            content_hash,
        })
    }
}

// ── Storage notifications ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records")]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    s3: NotificationEntity,
}

#[derive(Debug, Deserialize)]
struct NotificationEntity {
    object: NotificationObject,
}

#[derive(Debug, Deserialize)]
struct NotificationObject {
    key: String,
}

/// Object keys named by an object-created notification.
pub fn notification_keys(payload: &[u8]) -> Result<Vec<String>> {
    let notification: Notification = serde_json::from_slice(payload)
        .map_err(|e| IngestError::InputValidation(format!("malformed notification: {e}")))?;
    if notification.records.is_empty() {
        return Err(IngestError::InputValidation(
            "notification carries no records".into(),
        ));
    }
    Ok(notification
        .records
        .into_iter()
        .map(|r| r.s3.object.key)
        .collect())
}
