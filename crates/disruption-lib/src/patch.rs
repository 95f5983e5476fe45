//! Conditional removal of a single annotation
//!
//! The marker is removed with a one-operation JSON patch. A patch that
//! finds nothing to remove, or a workload that no longer exists, already
//! satisfies the goal and is reported as `AlreadyAbsent` rather than an error.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::PatchError;
use crate::models::WorkloadRef;

/// Field manager recorded on patches
pub const FIELD_MANAGER: &str = "disruption-window-controller";

/// How an annotation removal was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// This call removed the annotation
    Removed,
    /// The annotation (or the workload) was already gone
    AlreadyAbsent,
}

/// Trait for annotation mutation transports
#[async_trait]
pub trait WorkloadPatcher: Send + Sync {
    /// Remove `key` from the workload's annotations
    ///
    /// With `dry_run` the request is validated but not persisted.
    async fn remove_annotation(
        &self,
        workload: &WorkloadRef,
        key: &str,
        dry_run: bool,
    ) -> Result<Removal, PatchError>;
}

/// Result of one mutation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum PatchStatus {
    Removed,
    AlreadyAbsent,
    Failed(String),
}

/// Outcome recorded per attempted patch
#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub workload: WorkloadRef,
    pub status: PatchStatus,
}

impl PatchOutcome {
    pub fn from_result(workload: WorkloadRef, result: &Result<Removal, PatchError>) -> Self {
        let status = match result {
            Ok(Removal::Removed) => PatchStatus::Removed,
            Ok(Removal::AlreadyAbsent) => PatchStatus::AlreadyAbsent,
            Err(e) => PatchStatus::Failed(e.to_string()),
        };
        Self { workload, status }
    }

    pub fn succeeded(&self) -> bool {
        !matches!(self.status, PatchStatus::Failed(_))
    }
}

/// Escape a JSON-Pointer reference token (RFC 6901)
pub fn escape_json_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Path of an annotation inside an object
pub fn annotation_path(key: &str) -> String {
    format!("/metadata/annotations/{}", escape_json_pointer(key))
}

/// Build the single-operation patch removing an annotation
pub fn removal_patch(key: &str) -> Result<json_patch::Patch, serde_json::Error> {
    serde_json::from_value(serde_json::json!([
        { "op": "remove", "path": annotation_path(key) }
    ]))
}

/// Patches pods through the Kubernetes API
#[derive(Clone)]
pub struct KubePatcher {
    client: Client,
}

impl KubePatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadPatcher for KubePatcher {
    async fn remove_annotation(
        &self,
        workload: &WorkloadRef,
        key: &str,
        dry_run: bool,
    ) -> Result<Removal, PatchError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &workload.namespace);
        let params = PatchParams {
            dry_run,
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let patch = removal_patch(key)?;

        match api.patch(&workload.name, &params, &Patch::Json::<()>(patch)).await {
            Ok(_) => Ok(Removal::Removed),
            Err(kube::Error::Api(response)) if is_already_absent(&response) => {
                debug!(
                    namespace = %workload.namespace,
                    pod_name = %workload.name,
                    code = response.code,
                    "Annotation already absent"
                );
                Ok(Removal::AlreadyAbsent)
            }
            Err(kube::Error::Api(response)) if response.code == 422 => {
                confirm_absent(&api, workload, key, kube::Error::Api(response)).await
            }
            Err(e) => Err(PatchError::Kube(e)),
        }
    }
}

/// 404: the pod is gone; 422 from the remove op finding no such path
fn is_already_absent(response: &kube::error::ErrorResponse) -> bool {
    match response.code {
        404 => true,
        422 => is_missing_path(&response.message),
        _ => false,
    }
}

fn is_missing_path(message: &str) -> bool {
    message.contains("missing path") || message.contains("nonexistent")
}

/// Any other 422 counts as success only if a fresh read shows the annotation gone
async fn confirm_absent(
    api: &Api<Pod>,
    workload: &WorkloadRef,
    key: &str,
    rejection: kube::Error,
) -> Result<Removal, PatchError> {
    let still_present = api
        .get_opt(&workload.name)
        .await?
        .and_then(|pod| pod.metadata.annotations)
        .is_some_and(|annotations| annotations.contains_key(key));

    if still_present {
        return Err(PatchError::Kube(rejection));
    }
    debug!(
        namespace = %workload.namespace,
        pod_name = %workload.name,
        "Patch rejected but annotation confirmed absent"
    );
    Ok(Removal::AlreadyAbsent)
}
