//! Ingestion-request events and the publish-only bus they travel on.

use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TRIGGER_SOURCE: &str = "ingestion.trigger";
pub const TRIGGER_DETAIL_TYPE: &str = "Ingestion Trigger";

/// Payload asking the fetcher to ingest one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub key: String,
    pub symbol: String,
    /// Latest previous ingestion, or `None` when the source has no data yet.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

/// Envelope carried by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    pub source: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub bus: String,
    pub detail: IngestionRequest,
}

impl BusEvent {
    /// Wrap a request as a trigger event on the named bus.
    pub fn trigger(bus: &str, detail: IngestionRequest) -> Self {
        Self {
            source: TRIGGER_SOURCE.to_string(),
            detail_type: TRIGGER_DETAIL_TYPE.to_string(),
            bus: bus.to_string(),
            detail,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.source == TRIGGER_SOURCE && self.detail_type == TRIGGER_DETAIL_TYPE
    }
}

/// Publish-only event bus.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: &BusEvent) -> Result<()>;
}

/// Collects published events in memory.
#[derive(Debug, Default)]
pub struct MemoryBus {
    events: Mutex<Vec<BusEvent>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event published so far.
    pub fn events(&self) -> Vec<BusEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Take all pending events, leaving the bus empty.
    pub fn drain(&self) -> Vec<BusEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventBus for MemoryBus {
    fn publish(&self, event: &BusEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|e| IngestError::Publish(format!("lock poisoned: {e}")))?
            .push(event.clone());
        Ok(())
    }
}

/// Appends one JSON event per line to a spool file.
#[derive(Debug)]
pub struct SpoolBus {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SpoolBus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventBus for SpoolBus {
    fn publish(&self, event: &BusEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| IngestError::Publish(format!("event serialization: {e}")))?;

        let _guard = self
            .lock
            .lock()
            .map_err(|e| IngestError::Publish(format!("lock poisoned: {e}")))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| IngestError::Publish(format!("spool dir: {e}")))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IngestError::Publish(format!("open spool: {e}")))?;
        writeln!(file, "{line}").map_err(|e| IngestError::Publish(format!("append spool: {e}")))
    }
}

/// Read every event from a spool file. Blank lines are skipped.
pub fn read_spool(path: &Path) -> Result<Vec<BusEvent>> {
    let content = fs::read_to_string(path)
        .map_err(|e| IngestError::Storage(format!("read spool {}: {e}", path.display())))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                IngestError::InputValidation(format!("spool line {}: {e}", i + 1))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(start: Option<DateTime<Utc>>) -> IngestionRequest {
        IngestionRequest {
            key: "spy".into(),
            symbol: "SPY".into(),
            start,
        }
    }

    #[test]
    fn start_serializes_as_iso8601_or_null() {
        let at = Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap();
        let json = serde_json::to_value(request(Some(at))).unwrap();
        assert_eq!(json["start"], "2023-06-15T12:00:00Z");

        let json = serde_json::to_value(request(None)).unwrap();
        assert!(json["start"].is_null());
    }

    #[test]
    fn start_accepts_offsets_and_absence() {
        let req: IngestionRequest = serde_json::from_str(
            r#"{"key":"spy","symbol":"SPY","start":"2023-06-15T12:00:00+00:00"}"#,
        )
        .unwrap();
        assert_eq!(
            req.start,
            Some(Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap())
        );

        let req: IngestionRequest =
            serde_json::from_str(r#"{"key":"spy","symbol":"SPY"}"#).unwrap();
        assert_eq!(req.start, None);
    }

    #[test]
    fn envelope_attributes() {
        let event = BusEvent::trigger("iex-ingestion", request(None));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "ingestion.trigger");
        assert_eq!(json["detail-type"], "Ingestion Trigger");
        assert_eq!(json["bus"], "iex-ingestion");
        assert!(event.is_trigger());
    }

    #[test]
    fn memory_bus_drains() {
        let bus = MemoryBus::new();
        bus.publish(&BusEvent::trigger("b", request(None))).unwrap();
        bus.publish(&BusEvent::trigger("b", request(None))).unwrap();
        assert_eq!(bus.events().len(), 2);
        assert_eq!(bus.drain().len(), 2);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn spool_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bus = SpoolBus::new(dir.path().join("spool/events.jsonl"));
        let at = Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap();
        bus.publish(&BusEvent::trigger("b", request(Some(at)))).unwrap();
        bus.publish(&BusEvent::trigger("b", request(None))).unwrap();

        let events = read_spool(bus.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail.start, Some(at));
        assert_eq!(events[1].detail.start, None);
    }

    #[test]
    fn corrupt_spool_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        fs::write(&path, "not json\n").unwrap();
        assert!(read_spool(&path).unwrap_err().is_input_validation());
    }
}
