//! Core data models for the disruption controller

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Annotation that blocks voluntary disruption of a pod
pub const DO_NOT_DISRUPT_ANNOTATION: &str = "karpenter.sh/do-not-disrupt";

/// Cron expression (UTC) anchoring the pod's disruption window
pub const DISRUPTION_WINDOW_SCHEDULE_ANNOTATION: &str = "k8s.jukie.net/disruption-window-schedule";

/// How long the disruption window stays open after each firing
pub const DISRUPTION_WINDOW_DURATION_ANNOTATION: &str = "k8s.jukie.net/disruption-window-duration";

/// Kind reported on patch metrics
pub const WORKLOAD_KIND: &str = "Pod";

/// Identity of a workload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A pod as seen by the gate: its identity, node binding and annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub reference: WorkloadRef,
    pub node_name: String,
    pub annotations: BTreeMap<String, String>,
}

impl Workload {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            reference: WorkloadRef::new(namespace, name),
            node_name: node_name.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation (builder style, mostly for tests and previews)
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Build from a pod; pods without a name are ignored
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.clone()?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let node_name = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.node_name.clone())
            .unwrap_or_default();

        Some(Self {
            reference: WorkloadRef { namespace, name },
            node_name,
            annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        })
    }

    fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map(String::as_str).unwrap_or("")
    }

    /// Protected iff the do-not-disrupt marker is present and non-empty
    pub fn is_protected(&self) -> bool {
        !self.annotation(DO_NOT_DISRUPT_ANNOTATION).is_empty()
    }

    /// Window schedule, empty when unset
    pub fn window_schedule(&self) -> &str {
        self.annotation(DISRUPTION_WINDOW_SCHEDULE_ANNOTATION)
    }

    /// Window duration, empty when unset
    pub fn window_duration(&self) -> &str {
        self.annotation(DISRUPTION_WINDOW_DURATION_ANNOTATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use kube::api::ObjectMeta;

    #[test]
    fn test_workload_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: Some("shop".to_string()),
                annotations: Some(BTreeMap::from([(
                    DO_NOT_DISRUPT_ANNOTATION.to_string(),
                    "true".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("ip-10-0-0-1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let workload = Workload::from_pod(&pod).unwrap();
        assert_eq!(workload.reference.to_string(), "shop/web-0");
        assert_eq!(workload.node_name, "ip-10-0-0-1");
        assert!(workload.is_protected());
        assert_eq!(workload.window_schedule(), "");
    }

    #[test]
    fn test_workload_from_unnamed_pod() {
        assert!(Workload::from_pod(&Pod::default()).is_none());
    }

    #[test]
    fn test_empty_marker_is_not_protected() {
        let workload =
            Workload::new("default", "api", "node-a").with_annotation(DO_NOT_DISRUPT_ANNOTATION, "");
        assert!(!workload.is_protected());
    }
}
