//! BridgeExecutor Custom Resource Definition.
//!
//! Defines the executor of a single processor attached to a bridge.

use super::WorkloadStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// BridgeExecutor is the Schema for the bridgeexecutors API.
///
/// A BridgeExecutor runs one processor: it consumes events from the bridge,
/// applies the processor's filters and transformation and invokes its action.
/// The processor definition is carried verbatim as a JSON document.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "smartevents.io",
    version = "v1alpha1",
    kind = "BridgeExecutor",
    plural = "bridgeexecutors",
    shortname = "be",
    namespaced,
    derive = "PartialEq",
    status = "WorkloadStatus",
    printcolumn = r#"{"name":"Bridge", "type":"string", "jsonPath":".spec.bridgeId"}"#,
    printcolumn = r#"{"name":"Processor", "type":"string", "jsonPath":".spec.processorName"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BridgeExecutorSpec {
    /// Container image running the executor.
    #[serde(default = "default_image")]
    pub image: String,

    /// Identifier of the bridge the processor is attached to.
    pub bridge_id: String,

    /// Tenant that owns the bridge.
    pub customer_id: String,

    /// Identifier of the processor.
    pub processor_id: String,

    /// Tenant-chosen processor name.
    #[serde(default)]
    pub processor_name: String,

    /// Processor definition (filters, transformation, action) as JSON.
    #[serde(default)]
    pub definition: String,
}

/// Image used when a spec does not name one.
pub const DEFAULT_EXECUTOR_IMAGE: &str = "quay.io/5733d9e2be6485d52ffa08870cabdee0/executor:latest";

fn default_image() -> String {
    DEFAULT_EXECUTOR_IMAGE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn crd_metadata() {
        let crd = BridgeExecutor::crd();
        assert_eq!(crd.spec.group, "smartevents.io");
        assert_eq!(crd.spec.names.kind, "BridgeExecutor");
        assert_eq!(crd.spec.names.short_names, Some(vec!["be".to_string()]));
    }

    #[test]
    fn definition_defaults_to_empty() {
        let spec: BridgeExecutorSpec = serde_json::from_value(serde_json::json!({
            "bridgeId": "b-1",
            "customerId": "c-1",
            "processorId": "p-1"
        }))
        .unwrap();
        assert!(spec.definition.is_empty());
        assert_eq!(spec.image, default_image());
    }
}
