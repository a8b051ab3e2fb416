//! chartflow core: incremental chart ingestion into object storage.
//!
//! Three independent stages share nothing but the object store:
//! - Scheduler: finds sources whose latest raw snapshot is older than their
//!   frequency and publishes ingestion requests
//! - Fetcher: resolves the smallest chart range covering the request, calls
//!   the chart API, and stores the raw body under a 14-digit UTC stamp
//! - Normalizer: turns one raw snapshot into one typed Parquet artifact with
//!   the same stamp

pub mod clock;
pub mod config;
pub mod data;
pub mod definitions;
pub mod error;
pub mod events;
pub mod layout;
pub mod pipeline;
pub mod range;
pub mod recency;
pub mod store;
pub mod trigger;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Settings;
pub use definitions::{load_definitions, parse_definitions, SourceDefinition};
pub use error::IngestError;
pub use events::{read_spool, BusEvent, EventBus, IngestionRequest, MemoryBus, SpoolBus};
pub use layout::{RawObjectKey, StorageLayout};
pub use pipeline::{Pipeline, RunSummary};
pub use range::{ChartRange, RangeResolver};
pub use recency::RecencyTracker;
pub use store::{LocalStore, MemoryStore, ObjectStore};
pub use trigger::{is_due, Decision, Scheduler, TriggerReport};
