//! Chart data: fetching raw snapshots and normalizing them into artifacts.

pub mod artifact;
pub mod fetch;
pub mod iex;
pub mod normalize;
pub mod provider;

pub use artifact::{encode_artifact, read_artifact, ProcessedRecord};
pub use fetch::{FetchOutcome, Fetcher};
pub use iex::IexClient;
pub use normalize::{notification_keys, parse_records, NormalizeOutcome, Normalizer};
pub use provider::{ApiResponse, ChartApi};
