//! Triggering events and the filters deciding when a reconcile runs
//!
//! Two deployment modes feed the reconciler:
//! - Expiry: a Karpenter NodeClaim transitions into the `Expired` condition
//! - Blocked: Karpenter emits a `DisruptionBlocked` event against a Node

use k8s_openapi::api::core::v1::Event;
use kube::runtime::watcher;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ReconcileError;

/// Condition type set on NodeClaims past their expireAfter
pub const EXPIRED_CONDITION: &str = "Expired";

/// Event reason Karpenter uses when a node cannot be disrupted
pub const DISRUPTION_BLOCKED_REASON: &str = "DisruptionBlocked";

/// Involved object kind for blocked-disruption events
pub const NODE_KIND: &str = "Node";

/// Subset of the Karpenter NodeClaim spec this controller reads
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize)]
#[kube(
    group = "karpenter.sh",
    version = "v1",
    kind = "NodeClaim",
    status = "NodeClaimStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeClaimSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NodeClaim {
    /// Whether the named condition is present with status `True`
    pub fn condition_is_true(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.type_ == type_ && c.status == "True")
            })
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.condition_is_true(EXPIRED_CONDITION)
    }

    pub fn node_name(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.node_name.as_deref())
    }
}

/// The notification that starts one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggeringEvent {
    /// A NodeClaim became Expired
    Expired {
        claim: String,
        node_name: Option<String>,
    },
    /// Disruption of a node is being blocked
    DisruptionBlocked {
        event: String,
        node_name: Option<String>,
    },
}

impl TriggeringEvent {
    pub fn from_node_claim(claim: &NodeClaim) -> Self {
        TriggeringEvent::Expired {
            claim: claim.name_any(),
            node_name: claim.node_name().map(str::to_string),
        }
    }

    /// Build from a core Event, or `None` if it is not a blocked-disruption signal
    pub fn from_event(event: &Event) -> Option<Self> {
        if !is_disruption_blocked(event) {
            return None;
        }
        Some(TriggeringEvent::DisruptionBlocked {
            event: event.name_any(),
            node_name: event.involved_object.name.clone(),
        })
    }

    /// Normalized node identity; fails when the event names no node
    pub fn node_identity(&self) -> Result<&str, ReconcileError> {
        let node = match self {
            TriggeringEvent::Expired { node_name, .. } => node_name.as_deref(),
            TriggeringEvent::DisruptionBlocked { node_name, .. } => node_name.as_deref(),
        };
        node.filter(|n| !n.is_empty())
            .ok_or_else(|| ReconcileError::MissingNodeIdentity {
                source_name: self.to_string(),
            })
    }
}

impl fmt::Display for TriggeringEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggeringEvent::Expired { claim, .. } => write!(f, "nodeclaim/{claim}"),
            TriggeringEvent::DisruptionBlocked { event, .. } => write!(f, "event/{event}"),
        }
    }
}

/// Matches Node events with the DisruptionBlocked reason
pub fn is_disruption_blocked(event: &Event) -> bool {
    event.involved_object.kind.as_deref() == Some(NODE_KIND)
        && event.reason.as_deref() == Some(DISRUPTION_BLOCKED_REASON)
}

/// Server-side field selector equivalent of [`is_disruption_blocked`]
pub fn blocked_event_field_selector() -> String {
    format!("involvedObject.kind={NODE_KIND},reason={DISRUPTION_BLOCKED_REASON}")
}

/// Turns a NodeClaim watch stream into one trigger per Expired edge
///
/// Claims already expired when first seen trigger once (startup and
/// creation); afterwards only a not-true to true transition triggers.
#[derive(Debug, Default)]
pub struct ExpiryTracker {
    expired: HashMap<String, bool>,
}

impl ExpiryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one watcher event, returning the triggers it produces
    pub fn observe(&mut self, event: watcher::Event<NodeClaim>) -> Vec<TriggeringEvent> {
        match event {
            watcher::Event::Applied(claim) => self.apply(&claim).into_iter().collect(),
            watcher::Event::Deleted(claim) => {
                self.expired.remove(&claim.name_any());
                Vec::new()
            }
            watcher::Event::Restarted(claims) => {
                let previous = std::mem::take(&mut self.expired);
                claims
                    .iter()
                    .filter_map(|claim| {
                        let name = claim.name_any();
                        let was_expired = previous.get(&name).copied().unwrap_or(false);
                        let now_expired = claim.is_expired();
                        self.expired.insert(name, now_expired);
                        (!was_expired && now_expired).then(|| TriggeringEvent::from_node_claim(claim))
                    })
                    .collect()
            }
        }
    }

    fn apply(&mut self, claim: &NodeClaim) -> Option<TriggeringEvent> {
        let now_expired = claim.is_expired();
        let was_expired = self
            .expired
            .insert(claim.name_any(), now_expired)
            .unwrap_or(false);
        (!was_expired && now_expired).then(|| TriggeringEvent::from_node_claim(claim))
    }

    /// Number of claims currently tracked
    pub fn len(&self) -> usize {
        self.expired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }
}
