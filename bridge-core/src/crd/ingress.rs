//! BridgeIngress Custom Resource Definition.
//!
//! Defines the ingress endpoint of a single bridge.

use super::WorkloadStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// BridgeIngress is the Schema for the bridgeingresses API.
///
/// A BridgeIngress represents the CloudEvent ingestion endpoint of one tenant
/// bridge. The operator runs it as a Deployment behind a Service, with the
/// tenant credentials injected from a Secret of the same name.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "smartevents.io",
    version = "v1alpha1",
    kind = "BridgeIngress",
    plural = "bridgeingresses",
    shortname = "bi",
    namespaced,
    derive = "PartialEq",
    status = "WorkloadStatus",
    printcolumn = r#"{"name":"Bridge", "type":"string", "jsonPath":".spec.bridgeId"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Endpoint", "type":"string", "jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BridgeIngressSpec {
    /// Container image running the ingress.
    #[serde(default = "default_image")]
    pub image: String,

    /// Identifier of the owning bridge.
    pub bridge_id: String,

    /// Tenant that owns the bridge.
    pub customer_id: String,

    /// Tenant-chosen bridge name.
    #[serde(default)]
    pub bridge_name: String,
}

/// Image used when a spec does not name one.
pub const DEFAULT_INGRESS_IMAGE: &str = "quay.io/5733d9e2be6485d52ffa08870cabdee0/ingress:latest";

fn default_image() -> String {
    DEFAULT_INGRESS_IMAGE.to_string()
}
