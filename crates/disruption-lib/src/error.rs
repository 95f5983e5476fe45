//! Error types for the disruption controller

use thiserror::Error;

/// A malformed disruption window annotation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid disruption window schedule {expr:?}: {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("invalid disruption window duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("disruption window duration {value:?} is below the minimum of {floor}")]
    DurationBelowFloor { value: String, floor: String },
}

/// Workloads for a node could not be listed
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed listing pods on node {node}: {source}")]
    Kube {
        node: String,
        #[source]
        source: kube::Error,
    },
}

/// An annotation removal could not be applied
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("kubernetes API rejected patch: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed building JSON patch: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A reconciliation invocation failed as a whole
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("triggering event {source_name} carries no node name")]
    MissingNodeIdentity { source_name: String },

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl ReconcileError {
    /// Whether the event-delivery layer should try the invocation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Lookup(_))
    }
}
