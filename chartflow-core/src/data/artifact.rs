//! Processed artifact: typed, timestamp-indexed Parquet.
//!
//! Columns, in order:
//!
//! | column           | type                    |
//! |------------------|-------------------------|
//! | `timestamp`      | `Datetime(ms, "UTC")`   |
//! | `key`            | `Categorical`           |
//! | `percent_change` | `Float64`               |
//! | `volume`         | `Int64`                 |

use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::io::Cursor;

/// One trading day of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub percent_change: f64,
    pub volume: i64,
}

const COLUMNS: [&str; 4] = ["timestamp", "key", "percent_change", "volume"];

fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, Some("UTC".into()))
}

/// Convert records to a DataFrame with the artifact schema.
pub fn records_to_dataframe(records: &[ProcessedRecord]) -> Result<DataFrame> {
    let timestamps: Vec<i64> = records
        .iter()
        .map(|r| r.timestamp.timestamp_millis())
        .collect();
    let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
    let changes: Vec<f64> = records.iter().map(|r| r.percent_change).collect();
    let volumes: Vec<i64> = records.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps)
            .cast(&timestamp_dtype())
            .map_err(|e| IngestError::ParquetError(format!("timestamp cast: {e}")))?,
        Column::new("key".into(), keys)
            .cast(&DataType::Categorical(None, CategoricalOrdering::Physical))
            .map_err(|e| IngestError::ParquetError(format!("key cast: {e}")))?,
        Column::new("percent_change".into(), changes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| IngestError::ParquetError(format!("dataframe creation: {e}")))
}

/// Serialize records to Parquet bytes.
pub fn encode_artifact(records: &[ProcessedRecord]) -> Result<Vec<u8>> {
    let mut df = records_to_dataframe(records)?;
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(&mut df)
        .map_err(|e| IngestError::ParquetError(format!("write parquet: {e}")))?;
    Ok(buf)
}

/// Decode and validate an artifact produced by [`encode_artifact`].
pub fn read_artifact(bytes: &[u8]) -> Result<Vec<ProcessedRecord>> {
    let df = ParquetReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| IngestError::ParquetError(format!("read: {e}")))?;

    let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
    if names != COLUMNS {
        return Err(IngestError::InputValidation(format!(
            "unexpected artifact columns {names:?}"
        )));
    }

    dataframe_to_records(&df)
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<ProcessedRecord>> {
    let map_err = |e: PolarsError| IngestError::ParquetError(format!("column read: {e}"));

    let timestamps = df.column("timestamp").map_err(map_err)?;
    if timestamps.dtype() != &timestamp_dtype() {
        return Err(IngestError::InputValidation(format!(
            "timestamp column has type {}, expected {}",
            timestamps.dtype(),
            timestamp_dtype()
        )));
    }
    let ts_ca = timestamps
        .datetime()
        .map_err(|e| IngestError::ParquetError(format!("timestamp column type: {e}")))?;

    let keys = df
        .column("key")
        .map_err(map_err)?
        .cast(&DataType::String)
        .map_err(|e| IngestError::ParquetError(format!("key cast: {e}")))?;
    let key_ca = keys
        .str()
        .map_err(|e| IngestError::ParquetError(format!("key column type: {e}")))?;

    let change_ca = df
        .column("percent_change")
        .map_err(map_err)?
        .f64()
        .map_err(|e| IngestError::ParquetError(format!("percent_change column type: {e}")))?;
    let volume_ca = df
        .column("volume")
        .map_err(map_err)?
        .i64()
        .map_err(|e| IngestError::ParquetError(format!("volume column type: {e}")))?;

    (0..df.height())
        .map(|i| {
            let millis = ts_ca
                .get(i)
                .ok_or_else(|| IngestError::ParquetError(format!("null timestamp at row {i}")))?;
            let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                IngestError::ParquetError(format!("timestamp out of range at row {i}"))
            })?;
            let key = key_ca
                .get(i)
                .ok_or_else(|| IngestError::ParquetError(format!("null key at row {i}")))?;
            let volume = volume_ca
                .get(i)
                .ok_or_else(|| IngestError::ParquetError(format!("null volume at row {i}")))?;

            Ok(ProcessedRecord {
                timestamp,
                key: key.to_string(),
                percent_change: change_ca.get(i).unwrap_or(f64::NAN),
                volume,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vec<ProcessedRecord> {
        vec![
            ProcessedRecord {
                timestamp: Utc.with_ymd_and_hms(2023, 6, 16, 0, 0, 0).unwrap(),
                key: "ABC".into(),
                percent_change: 1.23,
                volume: 1_000_000,
            },
            ProcessedRecord {
                timestamp: Utc.with_ymd_and_hms(2023, 6, 17, 0, 0, 0).unwrap(),
                key: "ABC".into(),
                percent_change: -0.5,
                volume: 750_000,
            },
        ]
    }

    #[test]
    fn dataframe_has_artifact_schema() {
        let df = records_to_dataframe(&sample()).unwrap();
        let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, COLUMNS);
        assert_eq!(df.column("timestamp").unwrap().dtype(), &timestamp_dtype());
        assert!(matches!(
            df.column("key").unwrap().dtype(),
            DataType::Categorical(_, _)
        ));
        assert_eq!(df.column("percent_change").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("volume").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn artifact_decodes_to_the_same_records() {
        let bytes = encode_artifact(&sample()).unwrap();
        assert_eq!(read_artifact(&bytes).unwrap(), sample());
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(
            encode_artifact(&sample()).unwrap(),
            encode_artifact(&sample()).unwrap()
        );
    }

    #[test]
    fn garbage_is_not_an_artifact() {
        assert!(read_artifact(b"PAR1 nope").is_err());
    }
}
