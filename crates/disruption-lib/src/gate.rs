//! Batch gate: per-workload PATCH/SKIP decisions for one node

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Workload;
use crate::observability::MetricsSink;
use crate::window::{WindowEvaluator, WindowStatus};

/// Why a workload keeps its marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No do-not-disrupt marker, nothing to remove
    Unprotected,
    /// Protected and its disruption window is closed
    WindowClosed,
}

/// What to do with a workload's marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "reason")]
pub enum Action {
    Patch,
    Skip(SkipReason),
}

/// Gate verdict for one workload
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub workload: Workload,
    pub action: Action,
    /// Present whenever the window was consulted
    pub window: Option<WindowStatus>,
}

impl Decision {
    pub fn is_patch(&self) -> bool {
        self.action == Action::Patch
    }
}

/// Decides which protected workloads may have their marker lifted
pub struct BatchGate<'a> {
    evaluator: WindowEvaluator<'a>,
}

impl<'a> BatchGate<'a> {
    pub fn new(metrics: &'a dyn MetricsSink) -> Self {
        Self {
            evaluator: WindowEvaluator::new(metrics),
        }
    }

    /// Decide for every workload, sampling the clock once for the batch
    pub fn decide(&self, workloads: Vec<Workload>) -> Vec<Decision> {
        self.decide_at(workloads, Utc::now())
    }

    /// Decide for every workload as of `now`; output order follows input order
    pub fn decide_at(&self, workloads: Vec<Workload>, now: DateTime<Utc>) -> Vec<Decision> {
        workloads
            .into_iter()
            .map(|workload| self.decide_one(workload, now))
            .collect()
    }

    fn decide_one(&self, workload: Workload, now: DateTime<Utc>) -> Decision {
        if !workload.is_protected() {
            return Decision {
                workload,
                action: Action::Skip(SkipReason::Unprotected),
                window: None,
            };
        }

        let status = self.evaluator.evaluate(
            &workload.reference.to_string(),
            workload.window_schedule(),
            workload.window_duration(),
            now,
        );
        let action = if status.active {
            Action::Patch
        } else {
            Action::Skip(SkipReason::WindowClosed)
        };

        Decision {
            workload,
            action,
            window: Some(status),
        }
    }
}
