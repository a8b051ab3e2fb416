//! Fetcher: resolve range → call chart API → persist raw snapshot.

use super::provider::ChartApi;
use crate::clock::{format_stamp, Clock};
use crate::error::{IngestError, Result};
use crate::events::IngestionRequest;
use crate::layout::StorageLayout;
use crate::range::{resolve_at, ChartRange};
use crate::store::ObjectStore;
use std::sync::Arc;
use tracing::{error, info};

/// What one fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub key: String,
    pub symbol: String,
    pub range: ChartRange,
    /// HTTP status of the chart call.
    pub status: u16,
    /// Object key the raw snapshot was written to.
    pub raw_key: String,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The upstream failure, if the API answered with a non-success status.
    pub fn upstream_error(&self) -> Option<IngestError> {
        (!self.is_success()).then(|| IngestError::UpstreamApi {
            symbol: self.symbol.clone(),
            status: self.status,
        })
    }
}

pub struct Fetcher {
    api: Arc<dyn ChartApi>,
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    layout: StorageLayout,
}

impl Fetcher {
    pub fn new(
        api: Arc<dyn ChartApi>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            api,
            store,
            clock,
            layout,
        }
    }

    /// Handle one ingestion request.
    ///
    /// A non-success API status is logged and the error body is persisted
    /// anyway, so the snapshot history records the attempt.
    pub fn fetch(&self, request: &IngestionRequest) -> Result<FetchOutcome> {
        let range = resolve_at(self.clock.now(), request.start);
        let response = self.api.chart(&request.symbol, range)?;

        if !response.is_success() {
            error!(
                provider = self.api.name(),
                symbol = %request.symbol,
                status = response.status,
                "chart API call failed"
            );
        }

        let stamp = format_stamp(self.clock.now());
        let raw_key = self.layout.raw_key(&request.key, &stamp);
        self.store.put(&raw_key, &response.body)?;

        info!(
            key = %request.key,
            range = %range,
            bytes = response.body.len(),
            object = %raw_key,
            "stored raw snapshot"
        );

        Ok(FetchOutcome {
            key: request.key.clone(),
            symbol: request.symbol.clone(),
            range,
            status: response.status,
            raw_key,
        })
    }
}
