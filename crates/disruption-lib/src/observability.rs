//! Observability infrastructure for the disruption controller
//!
//! Provides:
//! - The `MetricsSink` seam the reconciler reports through
//! - Prometheus counters (patch operations, annotation parse failures)
//! - An in-memory sink for tests and offline previews
//! - Structured JSON logging with tracing

use prometheus::{register_int_counter_vec, IntCounterVec};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};
use tracing::{error, info, warn};

use crate::models::WorkloadRef;

/// Which per-workload annotation failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationType {
    DisruptionWindowSchedule,
    DisruptionWindowDuration,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::DisruptionWindowSchedule => "DisruptionWindowSchedule",
            AnnotationType::DisruptionWindowDuration => "DisruptionWindowDuration",
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters the core increments; injected so tests never touch global state
pub trait MetricsSink: Send + Sync {
    /// One increment per attempted mutation
    fn inc_patch_operation(&self, kind: &str, name: &str, succeeded: bool);

    /// One increment per malformed window annotation encountered
    fn inc_annotation_parse_failed(&self, annotation: AnnotationType, name: &str);
}

const NAMESPACE: &str = "karpenter_disruption_controller";

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    patch_operations: IntCounterVec,
    annotation_parse_failed: IntCounterVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            patch_operations: register_int_counter_vec!(
                format!("{NAMESPACE}_patch_operations_total"),
                "Number of patch events in total by the disruption controller. Labeled by resource kind, resource name, and success status.",
                &["kind", "name", "succeeded"]
            )
            .expect("Failed to register patch_operations_total"),

            annotation_parse_failed: register_int_counter_vec!(
                format!("{NAMESPACE}_annotation_parse_failed_total"),
                "Number of annotation parsing failures in total by the disruption controller. Labeled by annotation type and pod name.",
                &["type", "name"]
            )
            .expect("Failed to register annotation_parse_failed_total"),
        }
    }
}

/// Prometheus-backed metrics sink
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying counters.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    /// Create a new metrics handle (registers the counters on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    /// Current value of the patch counter for a label set
    pub fn patch_operations(&self, kind: &str, name: &str, succeeded: bool) -> u64 {
        self.inner()
            .patch_operations
            .with_label_values(&[kind, name, bool_label(succeeded)])
            .get()
    }
}

impl MetricsSink for ControllerMetrics {
    fn inc_patch_operation(&self, kind: &str, name: &str, succeeded: bool) {
        self.inner()
            .patch_operations
            .with_label_values(&[kind, name, bool_label(succeeded)])
            .inc();
    }

    fn inc_annotation_parse_failed(&self, annotation: AnnotationType, name: &str) {
        self.inner()
            .annotation_parse_failed
            .with_label_values(&[annotation.as_str(), name])
            .inc();
    }
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Records increments in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    patches: Mutex<HashMap<(String, String, bool), u64>>,
    parse_failures: Mutex<HashMap<(AnnotationType, String), u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patch_count(&self, name: &str, succeeded: bool) -> u64 {
        let patches = self.patches.lock().unwrap_or_else(|e| e.into_inner());
        patches
            .iter()
            .filter(|((_, n, s), _)| n == name && *s == succeeded)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn total_patches(&self) -> u64 {
        let patches = self.patches.lock().unwrap_or_else(|e| e.into_inner());
        patches.values().sum()
    }

    pub fn parse_failure_count(&self, annotation: AnnotationType, name: &str) -> u64 {
        let failures = self.parse_failures.lock().unwrap_or_else(|e| e.into_inner());
        failures
            .get(&(annotation, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// All parse failures recorded so far, for display
    pub fn parse_failures(&self) -> Vec<(AnnotationType, String, u64)> {
        let failures = self.parse_failures.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = failures
            .iter()
            .map(|((annotation, name), count)| (*annotation, name.clone(), *count))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.as_str().cmp(b.0.as_str())));
        out
    }
}

impl MetricsSink for InMemoryMetrics {
    fn inc_patch_operation(&self, kind: &str, name: &str, succeeded: bool) {
        let mut patches = self.patches.lock().unwrap_or_else(|e| e.into_inner());
        *patches
            .entry((kind.to_string(), name.to_string(), succeeded))
            .or_insert(0) += 1;
    }

    fn inc_annotation_parse_failed(&self, annotation: AnnotationType, name: &str) {
        let mut failures = self.parse_failures.lock().unwrap_or_else(|e| e.into_inner());
        *failures.entry((annotation, name.to_string())).or_insert(0) += 1;
    }
}

/// Structured logger for controller events
///
/// Provides consistent JSON-formatted logging for annotation removals,
/// closed windows, and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    controller: String,
}

impl StructuredLogger {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
        }
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str, trigger_mode: &str, dry_run: bool) {
        info!(
            event = "controller_started",
            controller = %self.controller,
            version = %version,
            trigger_mode = %trigger_mode,
            dry_run = dry_run,
            "Disruption controller started"
        );
        if dry_run {
            info!(
                event = "controller_started",
                controller = %self.controller,
                "Dry-run mode enabled, annotation removals will not be applied"
            );
        }
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            controller = %self.controller,
            reason = %reason,
            "Disruption controller shutting down"
        );
    }

    /// Log a successful (or already satisfied) marker removal
    pub fn log_protection_removed(&self, node: &str, workload: &WorkloadRef, already_absent: bool, dry_run: bool) {
        info!(
            event = "disruption_protection_removed",
            controller = %self.controller,
            node = %node,
            namespace = %workload.namespace,
            pod_name = %workload.name,
            already_absent = already_absent,
            dry_run = dry_run,
            "Removed do-not-disrupt annotation to allow deprovisioning"
        );
    }

    /// Log a failed marker removal
    pub fn log_patch_failed(&self, node: &str, workload: &WorkloadRef, error: &str) {
        error!(
            event = "disruption_protection_patch_failed",
            controller = %self.controller,
            node = %node,
            namespace = %workload.namespace,
            pod_name = %workload.name,
            error = %error,
            "Failed to remove do-not-disrupt annotation"
        );
    }

    /// Log a protected workload whose window is currently closed
    pub fn log_window_closed(&self, node: &str, workload: &WorkloadRef, schedule: &str) {
        info!(
            event = "disruption_window_closed",
            controller = %self.controller,
            node = %node,
            namespace = %workload.namespace,
            pod_name = %workload.name,
            schedule = %schedule,
            "Disruption window closed, keeping do-not-disrupt annotation"
        );
    }

    /// Log a failed reconciliation
    pub fn log_reconcile_failed(&self, trigger: &str, error: &str, will_retry: bool) {
        warn!(
            event = "reconcile_failed",
            controller = %self.controller,
            trigger = %trigger,
            error = %error,
            will_retry = will_retry,
            "Reconciliation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_metrics_counts_patches() {
        let metrics = ControllerMetrics::new();
        let before = metrics.patch_operations("Pod", "metrics-test-pod", true);

        metrics.inc_patch_operation("Pod", "metrics-test-pod", true);
        metrics.inc_annotation_parse_failed(AnnotationType::DisruptionWindowSchedule, "ns/metrics-test-pod");

        assert_eq!(metrics.patch_operations("Pod", "metrics-test-pod", true), before + 1);
    }

    #[test]
    fn test_controller_metrics_handles_share_counters() {
        let a = ControllerMetrics::new();
        let b = a.clone();
        let before = a.patch_operations("Pod", "shared-pod", false);

        b.inc_patch_operation("Pod", "shared-pod", false);

        assert_eq!(a.patch_operations("Pod", "shared-pod", false), before + 1);
    }

    #[test]
    fn test_in_memory_metrics() {
        let metrics = InMemoryMetrics::new();
        metrics.inc_patch_operation("Pod", "a", true);
        metrics.inc_patch_operation("Pod", "a", true);
        metrics.inc_patch_operation("Pod", "b", false);
        metrics.inc_annotation_parse_failed(AnnotationType::DisruptionWindowDuration, "ns/a");

        assert_eq!(metrics.patch_count("a", true), 2);
        assert_eq!(metrics.patch_count("b", false), 1);
        assert_eq!(metrics.total_patches(), 3);
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowDuration, "ns/a"),
            1
        );
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowSchedule, "ns/a"),
            0
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("nodeclaim-controller");
        assert_eq!(logger.controller, "nodeclaim-controller");
    }
}
