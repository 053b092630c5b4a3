//! Prometheus metrics.
//!
//! `Family<Labels, _>` gauges/histograms registered into a single global
//! `Registry`, built lazily via `once_cell`.

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::time::Instant;

/// The lifecycle operation an in-flight timer is tracking.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Operation {
    CreateSnapshot,
    CreateSnapshotAndReady,
    DeleteSnapshot,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateSnapshot => "CreateSnapshot",
            Operation::CreateSnapshotAndReady => "CreateSnapshotAndReady",
            Operation::DeleteSnapshot => "DeleteSnapshot",
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    UnknownError,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::UnknownError => "unknown",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation: String,
    pub outcome: String,
    pub driver: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub kind: String,
    pub result: String,
}

pub static OPERATION_DURATION_SECONDS: Lazy<Family<OperationLabels, Histogram>> =
    Lazy::new(|| Family::new_with_constructor(|| Histogram::new(exponential_buckets())));

pub static RECONCILE_TOTAL: Lazy<Family<ReconcileLabels, Counter>> = Lazy::new(Family::default);

pub static QUEUE_DEPTH: Lazy<Family<QueueLabels, prometheus_client::metrics::gauge::Gauge>> =
    Lazy::new(Family::default);

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct QueueLabels {
    pub kind: String,
}

fn exponential_buckets() -> impl Iterator<Item = f64> {
    [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0].into_iter()
}

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "snapshot_controller_operation_duration_seconds",
        "Duration of a tracked snapshot lifecycle operation",
        OPERATION_DURATION_SECONDS.clone(),
    );
    registry.register(
        "snapshot_controller_reconcile_total",
        "Total reconciliations per resource kind and outcome",
        RECONCILE_TOTAL.clone(),
    );
    registry.register(
        "snapshot_controller_queue_depth",
        "Current depth of the per-kind work queue",
        QUEUE_DEPTH.clone(),
    );
    registry
});

/// A started timer for a single snapshot-UID operation. Recording the
/// outcome is the caller's responsibility; the metric must be recorded
/// *before* the API status write that observes it, otherwise a conflict
/// retry on that write could lose the edge signal entirely.
pub struct OperationTimer {
    operation: Operation,
    driver: String,
    started: Instant,
}

impl OperationTimer {
    pub fn start(operation: Operation, driver: impl Into<String>) -> Self {
        OperationTimer {
            operation,
            driver: driver.into(),
            started: Instant::now(),
        }
    }

    pub fn record(self, outcome: Outcome) {
        let labels = OperationLabels {
            operation: self.operation.as_str().to_string(),
            outcome: outcome.as_str().to_string(),
            driver: self.driver.clone(),
        };
        OPERATION_DURATION_SECONDS
            .get_or_create(&labels)
            .observe(self.started.elapsed().as_secs_f64());
    }
}

pub fn record_reconcile(kind: &str, result: &str) {
    RECONCILE_TOTAL
        .get_or_create(&ReconcileLabels {
            kind: kind.to_string(),
            result: result.to_string(),
        })
        .inc();
}

pub fn set_queue_depth(kind: &str, depth: i64) {
    QUEUE_DEPTH
        .get_or_create(&QueueLabels {
            kind: kind.to_string(),
        })
        .set(depth);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_timer_records_into_family() {
        let timer = OperationTimer::start(Operation::CreateSnapshot, "hostpath.csi.k8s.io");
        timer.record(Outcome::Success);
        let labels = OperationLabels {
            operation: "CreateSnapshot".to_string(),
            outcome: "success".to_string(),
            driver: "hostpath.csi.k8s.io".to_string(),
        };
        assert!(OPERATION_DURATION_SECONDS.get_or_create(&labels).get().1 >= 1);
    }

    #[test]
    fn reconcile_counter_increments() {
        record_reconcile("VolumeSnapshot", "success");
        let value = RECONCILE_TOTAL
            .get_or_create(&ReconcileLabels {
                kind: "VolumeSnapshot".to_string(),
                result: "success".to_string(),
            })
            .get();
        assert!(value >= 1);
    }
}
