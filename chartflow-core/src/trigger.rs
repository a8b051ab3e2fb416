//! Scheduler: decides which sources are due and publishes ingestion requests.
//!
//! A source is due when it has never been ingested, or when at least its
//! configured frequency has elapsed since the latest raw snapshot. Each source
//! is evaluated independently; a failure on one never stops the others.

use crate::clock::Clock;
use crate::definitions::SourceDefinition;
use crate::error::IngestError;
use crate::events::{BusEvent, EventBus, IngestionRequest};
use crate::recency::RecencyTracker;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Due check. The comparison is inclusive.
pub fn is_due(now: DateTime<Utc>, latest: Option<DateTime<Utc>>, frequency: Duration) -> bool {
    match latest {
        None => true,
        Some(latest) => now - latest >= frequency,
    }
}

/// Outcome of evaluating one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub key: String,
    pub symbol: String,
    pub latest: Option<DateTime<Utc>>,
    pub due: bool,
}

impl Decision {
    pub fn request(&self) -> IngestionRequest {
        IngestionRequest {
            key: self.key.clone(),
            symbol: self.symbol.clone(),
            start: self.latest,
        }
    }
}

/// Result of one scheduler invocation.
#[derive(Debug, Default)]
pub struct TriggerReport {
    pub published: Vec<IngestionRequest>,
    pub not_due: Vec<String>,
    pub failed: Vec<(String, IngestError)>,
}

impl TriggerReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-source due evaluation and publishing.
pub struct Scheduler {
    recency: RecencyTracker,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    bus_name: String,
}

impl Scheduler {
    pub fn new(
        recency: RecencyTracker,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        bus_name: impl Into<String>,
    ) -> Self {
        Self {
            recency,
            bus,
            clock,
            bus_name: bus_name.into(),
        }
    }

    /// Evaluate one definition without publishing anything.
    pub fn evaluate(&self, definition: &SourceDefinition) -> Result<Decision, IngestError> {
        let latest = self.recency.latest_ingestion(&definition.key)?;
        let now = self.clock.now();
        Ok(Decision {
            key: definition.key.clone(),
            symbol: definition.symbol.clone(),
            latest,
            due: is_due(now, latest, definition.frequency),
        })
    }

    /// Evaluate every definition and publish one request per due source.
    pub fn run(&self, definitions: &[SourceDefinition]) -> TriggerReport {
        let mut report = TriggerReport::default();

        for definition in definitions {
            let decision = match self.evaluate(definition) {
                Ok(d) => d,
                Err(e) => {
                    error!(key = %definition.key, error = %e, "failed to evaluate source");
                    report.failed.push((definition.key.clone(), e));
                    continue;
                }
            };

            if !decision.due {
                debug!(key = %decision.key, latest = ?decision.latest, "source not due");
                report.not_due.push(decision.key);
                continue;
            }

            let request = decision.request();
            let event = BusEvent::trigger(&self.bus_name, request.clone());
            match self.bus.publish(&event) {
                Ok(()) => {
                    info!(
                        key = %request.key,
                        symbol = %request.symbol,
                        start = ?request.start,
                        "published ingestion request"
                    );
                    report.published.push(request);
                }
                Err(e) => {
                    error!(key = %definition.key, error = %e, "failed to publish ingestion request");
                    report.failed.push((definition.key.clone(), e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::events::MemoryBus;
    use crate::layout::StorageLayout;
    use crate::store::{MemoryStore, ObjectStore};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap()
    }

    fn def(key: &str, frequency: Duration) -> SourceDefinition {
        SourceDefinition {
            key: key.into(),
            symbol: key.to_uppercase(),
            frequency,
        }
    }

    #[test]
    fn due_rules() {
        let day = Duration::days(1);
        assert!(is_due(now(), Some(now() - Duration::hours(25)), day));
        assert!(!is_due(now(), Some(now() - Duration::hours(1)), day));
        assert!(is_due(now(), None, day));
        assert!(is_due(now(), Some(now() - day), day));
    }

    struct FailingBus;

    impl EventBus for FailingBus {
        fn publish(&self, _event: &BusEvent) -> Result<(), IngestError> {
            Err(IngestError::Publish("bus offline".into()))
        }
    }

    fn scheduler(
        store: Arc<MemoryStore>,
        bus: Arc<dyn EventBus>,
    ) -> Scheduler {
        let layout = StorageLayout::new("p");
        Scheduler::new(
            RecencyTracker::new(store, layout),
            bus,
            Arc::new(FixedClock::new(now())),
            "test-bus",
        )
    }

    #[test]
    fn publishes_only_due_sources() {
        let store = Arc::new(MemoryStore::new());
        // fresh: ingested one hour ago
        store.put("p/raw/fresh/20230615110000.json", b"[]").unwrap();
        // stale: ingested 25 hours ago
        store.put("p/raw/stale/20230614110000.json", b"[]").unwrap();

        let bus = Arc::new(MemoryBus::new());
        let report = scheduler(store, bus.clone()).run(&[
            def("fresh", Duration::days(1)),
            def("stale", Duration::days(1)),
            def("new", Duration::days(1)),
        ]);

        assert!(report.all_succeeded());
        assert_eq!(report.not_due, vec!["fresh"]);

        let events = bus.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_trigger() && e.bus == "test-bus"));
        assert_eq!(events[0].detail.key, "stale");
        assert_eq!(
            events[0].detail.start,
            Some(Utc.with_ymd_and_hms(2023, 6, 14, 11, 0, 0).unwrap())
        );
        assert_eq!(events[1].detail.key, "new");
        assert_eq!(events[1].detail.start, None);
    }

    #[test]
    fn publish_failure_does_not_stop_other_sources() {
        let store = Arc::new(MemoryStore::new());
        let report = scheduler(store, Arc::new(FailingBus)).run(&[
            def("a", Duration::days(1)),
            def("b", Duration::days(1)),
        ]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.published.is_empty());
    }

    struct BrokenStore;

    impl ObjectStore for BrokenStore {
        fn get(&self, key: &str) -> Result<Vec<u8>, IngestError> {
            Err(IngestError::ObjectNotFound { key: key.into() })
        }
        fn put(&self, _key: &str, _body: &[u8]) -> Result<(), IngestError> {
            Ok(())
        }
        fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError> {
            if prefix.contains("/broken/") {
                Err(IngestError::Storage("listing denied".into()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn listing_failure_is_isolated_to_its_source() {
        let bus = Arc::new(MemoryBus::new());
        let sched = Scheduler::new(
            RecencyTracker::new(Arc::new(BrokenStore), StorageLayout::new("p")),
            bus.clone(),
            Arc::new(FixedClock::new(now())),
            "test-bus",
        );
        let report = sched.run(&[def("broken", Duration::days(1)), def("ok", Duration::days(1))]);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert_eq!(report.published.len(), 1);
        assert_eq!(report.published[0].key, "ok");
    }

    proptest! {
        #[test]
        fn identical_inputs_give_identical_decisions(
            elapsed in 0i64..(10 * 86_400),
            freq in 0i64..(10 * 86_400),
        ) {
            let latest = Some(now() - Duration::seconds(elapsed));
            let frequency = Duration::seconds(freq);
            prop_assert_eq!(
                is_due(now(), latest, frequency),
                is_due(now(), latest, frequency)
            );
            prop_assert_eq!(is_due(now(), latest, frequency), elapsed >= freq);
        }
    }
}
