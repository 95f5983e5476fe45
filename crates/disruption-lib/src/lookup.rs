//! Listing the workloads bound to a node

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use crate::error::LookupError;
use crate::models::Workload;

/// Trait for workload lookups keyed by node binding
#[async_trait]
pub trait WorkloadLookup: Send + Sync {
    /// All workloads whose node binding equals `node`
    async fn workloads_on_node(&self, node: &str) -> Result<Vec<Workload>, LookupError>;
}

/// Lists pods through the Kubernetes API using the `spec.nodeName` field index
#[derive(Clone)]
pub struct KubeWorkloadLookup {
    client: Client,
}

impl KubeWorkloadLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadLookup for KubeWorkloadLookup {
    async fn workloads_on_node(&self, node: &str) -> Result<Vec<Workload>, LookupError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&node_selector(node));

        let pods = api.list(&params).await.map_err(|source| LookupError::Kube {
            node: node.to_string(),
            source,
        })?;

        let workloads = bound_to(pods.items.iter().filter_map(Workload::from_pod), node);
        debug!(node = %node, count = workloads.len(), "Listed workloads on node");
        Ok(workloads)
    }
}

fn node_selector(node: &str) -> String {
    format!("spec.nodeName={node}")
}

/// Keep only workloads bound to `node`
pub fn bound_to(workloads: impl IntoIterator<Item = Workload>, node: &str) -> Vec<Workload> {
    workloads
        .into_iter()
        .filter(|w| w.node_name == node)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_selector() {
        assert_eq!(node_selector("ip-10-0-1-7"), "spec.nodeName=ip-10-0-1-7");
    }

    #[test]
    fn test_bound_to_filters_other_nodes() {
        let workloads = vec![
            Workload::new("a", "on-node", "node-1"),
            Workload::new("a", "elsewhere", "node-2"),
            Workload::new("a", "unscheduled", ""),
        ];

        let kept = bound_to(workloads, "node-1");

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].reference.name, "on-node");
    }

    mod transport {
        use super::*;
        use mockito::{Matcher, Server};
        use serde_json::json;

        fn pod(name: &str, node: &str) -> serde_json::Value {
            json!({
                "metadata": {
                    "name": name,
                    "namespace": "testing",
                    "annotations": { "karpenter.sh/do-not-disrupt": "true" }
                },
                "spec": { "nodeName": node, "containers": [{ "name": "app" }] }
            })
        }

        #[tokio::test]
        async fn test_lists_pods_with_node_field_selector() {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("GET", "/api/v1/pods")
                .match_query(Matcher::UrlEncoded(
                    "fieldSelector".into(),
                    "spec.nodeName=node-1".into(),
                ))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    json!({
                        "apiVersion": "v1",
                        "kind": "PodList",
                        "metadata": {},
                        "items": [pod("web-0", "node-1"), pod("stray", "node-2")]
                    })
                    .to_string(),
                )
                .create_async()
                .await;
            let client = Client::try_from(kube::Config::new(server.url().parse().unwrap())).unwrap();

            let workloads = KubeWorkloadLookup::new(client)
                .workloads_on_node("node-1")
                .await
                .unwrap();

            mock.assert_async().await;
            assert_eq!(workloads.len(), 1);
            assert_eq!(workloads[0].reference.to_string(), "testing/web-0");
            assert!(workloads[0].is_protected());
        }

        #[tokio::test]
        async fn test_list_failure_names_the_node() {
            let mut server = Server::new_async().await;
            server
                .mock("GET", "/api/v1/pods")
                .match_query(Matcher::Any)
                .with_status(503)
                .with_header("content-type", "application/json")
                .with_body(
                    json!({
                        "apiVersion": "v1",
                        "kind": "Status",
                        "status": "Failure",
                        "message": "the server is currently unable to handle the request",
                        "reason": "ServiceUnavailable",
                        "code": 503
                    })
                    .to_string(),
                )
                .create_async()
                .await;
            let client = Client::try_from(kube::Config::new(server.url().parse().unwrap())).unwrap();

            let err = KubeWorkloadLookup::new(client)
                .workloads_on_node("node-1")
                .await
                .unwrap_err();

            assert!(matches!(err, LookupError::Kube { ref node, .. } if node == "node-1"));
        }
    }
}
