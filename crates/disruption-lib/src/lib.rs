//! Disruption window library
//!
//! This crate provides the core functionality for:
//! - Evaluating per-workload disruption windows from cron annotations
//! - Deciding which protected workloads may lose their do-not-disrupt marker
//! - Reconciling a triggering node event into conditional annotation patches
//! - Trigger filtering for expired NodeClaims and DisruptionBlocked events
//! - Health checks and observability

pub mod error;
pub mod gate;
pub mod health;
pub mod lookup;
pub mod models;
pub mod observability;
pub mod patch;
pub mod reconciler;
pub mod trigger;
pub mod window;

pub use error::{LookupError, PatchError, ReconcileError, WindowError};
pub use gate::{Action, BatchGate, Decision, SkipReason};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use lookup::{KubeWorkloadLookup, WorkloadLookup};
pub use models::*;
pub use observability::{AnnotationType, ControllerMetrics, InMemoryMetrics, MetricsSink, StructuredLogger};
pub use patch::{KubePatcher, PatchOutcome, PatchStatus, Removal, WorkloadPatcher};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerSettings};
pub use trigger::{ExpiryTracker, NodeClaim, TriggeringEvent};
pub use window::{WindowEvaluator, WindowSchedule, WindowState, WindowStatus};
