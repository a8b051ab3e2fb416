//! Recency tracking from raw snapshot listings.
//!
//! The set of raw snapshot keys is the only cross-invocation state the
//! pipeline has. The newest stamp under a source's raw prefix is the time of
//! its most recent ingestion attempt.

use crate::clock::{is_stamp_shaped, parse_stamp};
use crate::error::Result;
use crate::layout::{StorageLayout, RAW_EXTENSION};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Reads raw snapshot listings to find the latest ingestion per source.
#[derive(Clone)]
pub struct RecencyTracker {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
}

impl RecencyTracker {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    /// Instant of the newest raw snapshot for `source_key`, if any.
    pub fn latest_ingestion(&self, source_key: &str) -> Result<Option<DateTime<Utc>>> {
        let prefix = self.layout.raw_prefix(source_key);
        let keys = self.store.list(&prefix)?;
        let latest = latest_stamp(&prefix, &keys);

        info!(
            key = source_key,
            latest = ?latest,
            "determined latest ingestion"
        );
        Ok(latest)
    }
}

/// Newest valid stamp among `keys` directly under `prefix`.
///
/// Only names of the form `{14 digits}.json` count. Fixed-width stamps sort
/// chronologically, so the greatest name is the newest.
pub fn latest_stamp(prefix: &str, keys: &[String]) -> Option<DateTime<Utc>> {
    let mut stamps: Vec<&str> = keys
        .iter()
        .filter_map(|key| key.strip_prefix(prefix))
        .filter_map(snapshot_stamp)
        .collect();
    stamps.sort_unstable();

    stamps.into_iter().rev().find_map(|stamp| {
        let parsed = parse_stamp(stamp);
        if parsed.is_none() {
            warn!(stamp, "ignoring snapshot name that is not a valid instant");
        }
        parsed
    })
}

fn snapshot_stamp(filename: &str) -> Option<&str> {
    let stamp = filename.strip_suffix(RAW_EXTENSION)?.strip_suffix('.')?;
    is_stamp_shaped(stamp).then_some(stamp)
}
