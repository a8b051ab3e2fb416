//! Object key layout under the configured prefix.
//!
//! ```text
//! {prefix}/definitions.json
//! {prefix}/raw/{key_lower}/{YYYYMMDDHHMMSS}.json
//! {prefix}/processed/{KEY_UPPER}/{YYYYMMDDHHMMSS}.parquet
//! ```

use crate::clock::is_stamp_shaped;
use crate::error::{IngestError, Result};

pub const RAW_EXTENSION: &str = "json";
pub const PROCESSED_EXTENSION: &str = "parquet";
const DEFINITIONS_FILE: &str = "definitions.json";

/// Builds and parses object keys for one storage prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageLayout {
    prefix: String,
}

impl StorageLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn join(&self, rest: &str) -> String {
        if self.prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{rest}", self.prefix)
        }
    }

    /// Key of the source definition list.
    pub fn definitions_key(&self) -> String {
        self.join(DEFINITIONS_FILE)
    }

    /// Listing prefix for a source's raw snapshots, with trailing slash.
    pub fn raw_prefix(&self, source_key: &str) -> String {
        self.join(&format!("raw/{}/", source_key.to_lowercase()))
    }

    pub fn raw_key(&self, source_key: &str, stamp: &str) -> String {
        format!("{}{stamp}.{RAW_EXTENSION}", self.raw_prefix(source_key))
    }

    pub fn processed_key(&self, source_key: &str, stamp: &str) -> String {
        self.join(&format!(
            "processed/{}/{stamp}.{PROCESSED_EXTENSION}",
            source_key.to_uppercase()
        ))
    }
}

/// Components of a raw snapshot key, as seen by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObjectKey {
    /// Canonical uppercase source tag.
    pub source_key: String,
    /// 14-digit ingestion stamp.
    pub stamp: String,
}

impl RawObjectKey {
    /// Decompose `.../{source_key}/{stamp}.{ext}`.
    ///
    /// Everything before the last two segments is ignored. The file name must
    /// be exactly one stamp and one extension, and the extension must be
    /// `json`.
    pub fn parse(object_key: &str) -> Result<Self> {
        let mut segments = object_key.rsplit('/');
        let filename = segments.next().unwrap_or_default();
        let source_key = segments.next().unwrap_or_default();

        if source_key.is_empty() || filename.is_empty() {
            return Err(IngestError::InputValidation(format!(
                "object key '{object_key}' is not of the form .../{{source_key}}/{{filename}}"
            )));
        }

        let parts: Vec<&str> = filename.split('.').collect();
        let [stamp, ext] = parts.as_slice() else {
            return Err(IngestError::InputValidation(format!(
                "file name '{filename}' is not of the form {{timestamp}}.{{extension}}"
            )));
        };

        if *ext != RAW_EXTENSION {
            return Err(IngestError::InputValidation(format!(
                "expected a .{RAW_EXTENSION} snapshot, got '{filename}'"
            )));
        }

        if !is_stamp_shaped(stamp) {
            return Err(IngestError::InputValidation(format!(
                "file name '{filename}' does not start with a 14-digit timestamp"
            )));
        }

        Ok(Self {
            source_key: source_key.to_uppercase(),
            stamp: stamp.to_string(),
        })
    }
}
