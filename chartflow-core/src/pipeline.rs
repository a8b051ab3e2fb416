//! In-process orchestration: trigger → fetch → normalize in one invocation.
//!
//! Each stage still handles its units independently. The in-memory bus stands
//! in for the event bus and every stored raw snapshot is handed to the
//! normalizer, the way an object-created notification would.

use crate::clock::Clock;
use crate::data::{ChartApi, FetchOutcome, Fetcher, NormalizeOutcome, Normalizer};
use crate::definitions::load_definitions;
use crate::error::{IngestError, Result};
use crate::events::MemoryBus;
use crate::layout::StorageLayout;
use crate::recency::RecencyTracker;
use crate::store::ObjectStore;
use crate::trigger::Scheduler;
use std::sync::Arc;
use tracing::{error, info};

/// Everything a pipeline run needs.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn ObjectStore>,
    pub api: Arc<dyn ChartApi>,
    pub clock: Arc<dyn Clock>,
    pub layout: StorageLayout,
    pub bus_name: String,
}

/// Summary of one pipeline run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub published: usize,
    pub not_due: usize,
    pub fetched: Vec<FetchOutcome>,
    pub normalized: Vec<NormalizeOutcome>,
    /// `(unit, error)` for every unit that failed, in any stage.
    pub errors: Vec<(String, IngestError)>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Pipeline {
    pub fn recency(&self) -> RecencyTracker {
        RecencyTracker::new(self.store.clone(), self.layout.clone())
    }

    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(
            self.api.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.layout.clone(),
        )
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.store.clone(), self.layout.clone())
    }

    /// Run all three stages once.
    ///
    /// Only a broken definition list aborts the run; every other failure is
    /// recorded against its unit and the run continues.
    pub fn run_once(&self) -> Result<RunSummary> {
        let definitions = load_definitions(self.store.as_ref(), &self.layout)?;

        let bus = Arc::new(MemoryBus::new());
        let scheduler = Scheduler::new(
            self.recency(),
            bus.clone(),
            self.clock.clone(),
            self.bus_name.clone(),
        );
        let report = scheduler.run(&definitions);

        let mut summary = RunSummary {
            published: report.published.len(),
            not_due: report.not_due.len(),
            errors: report.failed,
            ..Default::default()
        };

        let fetcher = self.fetcher();
        let normalizer = self.normalizer();

        for event in bus.drain() {
            let request = event.detail;
            let outcome = match fetcher.fetch(&request) {
                Ok(o) => o,
                Err(e) => {
                    error!(key = %request.key, error = %e, "fetch failed");
                    summary.errors.push((request.key.clone(), e));
                    continue;
                }
            };
            if let Some(e) = outcome.upstream_error() {
                summary.errors.push((request.key.clone(), e));
            }

            match normalizer.normalize(&outcome.raw_key) {
                Ok(n) => summary.normalized.push(n),
                Err(e) => {
                    error!(object = %outcome.raw_key, error = %e, "normalization failed");
                    summary.errors.push((outcome.raw_key.clone(), e));
                }
            }
            summary.fetched.push(outcome);
        }

        info!(
            published = summary.published,
            not_due = summary.not_due,
            fetched = summary.fetched.len(),
            normalized = summary.normalized.len(),
            failed = summary.errors.len(),
            "pipeline run complete"
        );
        Ok(summary)
    }
}
