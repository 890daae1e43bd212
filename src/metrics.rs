use crate::telemetry::{runtime_counters, RuntimeCounters};
use std::sync::OnceLock;
use std::time::Duration;

pub use crate::telemetry::{
    RuntimeCountersSnapshot, TransformDurationSnapshot, TransformOutcomeSnapshot,
};

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn transform_durations_snapshot(&self) -> Vec<TransformDurationSnapshot> {
        self.counters.transform_durations_snapshot()
    }

    pub fn record_pipeline_started(&self) {
        self.counters.inc_pipelines_started();
    }

    pub fn record_pipeline_completed(&self) {
        self.counters.inc_pipelines_completed();
    }

    pub fn record_pipeline_aborted(&self) {
        self.counters.inc_pipelines_aborted();
    }

    pub fn record_transform_executed(
        &self,
        transform: &str,
        side: &'static str,
        elapsed: Duration,
    ) {
        self.counters
            .record_transform_executed(transform, side, elapsed);
    }

    pub fn record_transform_skipped(&self, transform: &str, side: &'static str) {
        self.counters.record_transform_skipped(transform, side);
    }

    pub fn record_transform_failed(&self, transform: &str, side: &'static str) {
        self.counters.record_transform_failed(transform, side);
    }
}

/// Returns the shared `MetricsCollector` instance.
pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}
