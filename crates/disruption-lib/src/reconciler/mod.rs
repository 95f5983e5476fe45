//! Reconciliation driver
//!
//! One invocation per delivered trigger: resolve the node, list its
//! workloads, run the batch gate, then remove the do-not-disrupt marker from
//! every workload the gate lets through. Patch failures are recorded and do
//! not stop the batch; a lookup failure fails the whole invocation so the
//! delivery layer can retry it. No state survives between invocations.


use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::gate::{Action, BatchGate, Decision, SkipReason};
use crate::lookup::WorkloadLookup;
use crate::models::{WorkloadRef, DO_NOT_DISRUPT_ANNOTATION, WORKLOAD_KIND};
use crate::observability::{MetricsSink, StructuredLogger};
use crate::patch::{PatchOutcome, Removal, WorkloadPatcher};
use crate::trigger::TriggeringEvent;

/// Settings threaded into the reconciler at construction
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Validate patches server-side without persisting them
    pub dry_run: bool,
    /// Annotation removed from workloads whose window is open
    pub marker_key: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            dry_run: true,
            marker_key: DO_NOT_DISRUPT_ANNOTATION.to_string(),
        }
    }
}

/// What one invocation decided and did
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub node: String,
    pub decisions: Vec<Decision>,
    pub outcomes: Vec<PatchOutcome>,
    /// Shutdown was signalled before every patch was issued
    pub interrupted: bool,
}

impl ReconcileReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    pub fn patch_decisions(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_patch()).count()
    }
}

/// Drives one reconciliation per triggering event
pub struct Reconciler {
    lookup: Arc<dyn WorkloadLookup>,
    patcher: Arc<dyn WorkloadPatcher>,
    metrics: Arc<dyn MetricsSink>,
    settings: ReconcilerSettings,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(
        lookup: Arc<dyn WorkloadLookup>,
        patcher: Arc<dyn WorkloadPatcher>,
        metrics: Arc<dyn MetricsSink>,
        settings: ReconcilerSettings,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            lookup,
            patcher,
            metrics,
            settings,
            logger,
        }
    }

    /// Reconcile a trigger against the current time
    pub async fn reconcile(
        &self,
        trigger: &TriggeringEvent,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.reconcile_at(trigger, Utc::now(), shutdown).await
    }

    /// Reconcile a trigger, evaluating windows as of `now`
    pub async fn reconcile_at(
        &self,
        trigger: &TriggeringEvent,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let node = trigger.node_identity()?.to_string();
        debug!(trigger = %trigger, node = %node, "Reconciling node");

        let workloads = self.lookup.workloads_on_node(&node).await?;

        let decisions = BatchGate::new(self.metrics.as_ref()).decide_at(workloads, now);
        for decision in &decisions {
            if decision.action == Action::Skip(SkipReason::WindowClosed) {
                self.logger.log_window_closed(
                    &node,
                    &decision.workload.reference,
                    decision.workload.window_schedule(),
                );
            }
        }

        let mut outcomes = Vec::new();
        let mut interrupted = false;
        for decision in decisions.iter().filter(|d| d.is_patch()) {
            if *shutdown.borrow() {
                info!(node = %node, remaining = decisions.iter().filter(|d| d.is_patch()).count() - outcomes.len(), "Shutdown requested, not issuing further patches");
                interrupted = true;
                break;
            }
            outcomes.push(self.apply(&node, &decision.workload.reference).await);
        }

        let report = ReconcileReport {
            node,
            decisions,
            outcomes,
            interrupted,
        };
        info!(
            trigger = %trigger,
            node = %report.node,
            workloads = report.decisions.len(),
            patched = report.succeeded(),
            failed = report.failed(),
            dry_run = self.settings.dry_run,
            "Reconciled node"
        );
        Ok(report)
    }

    /// Issue one marker removal and record its outcome
    async fn apply(&self, node: &str, workload: &WorkloadRef) -> PatchOutcome {
        let result = self
            .patcher
            .remove_annotation(workload, &self.settings.marker_key, self.settings.dry_run)
            .await;

        match &result {
            Ok(removal) => self.logger.log_protection_removed(
                node,
                workload,
                *removal == Removal::AlreadyAbsent,
                self.settings.dry_run,
            ),
            Err(e) => self.logger.log_patch_failed(node, workload, &e.to_string()),
        }

        let outcome = PatchOutcome::from_result(workload.clone(), &result);
        self.metrics
            .inc_patch_operation(WORKLOAD_KIND, &workload.name, outcome.succeeded());
        outcome
    }
}
