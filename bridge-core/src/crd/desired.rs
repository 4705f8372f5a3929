//! Kind-agnostic view over the bridge custom resources.

use super::{BridgeExecutor, BridgeIngress};
use crate::condition::{Condition, ConditionType, find_by_type, overall_ready};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status shared by every desired resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    /// Readiness conditions, at most one per type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Resolved in-cluster endpoint, set once the workload is ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl WorkloadStatus {
    /// Whether every required condition is `True`.
    pub fn is_ready(&self) -> bool {
        overall_ready(&self.conditions)
    }

    /// Look up a condition by type.
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        find_by_type(&self.conditions, condition_type)
    }
}

/// Kind of desired resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    /// A [`BridgeIngress`].
    Ingress,
    /// A [`BridgeExecutor`].
    Executor,
}

impl WorkloadKind {
    /// Custom resource kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Ingress => "BridgeIngress",
            WorkloadKind::Executor => "BridgeExecutor",
        }
    }

    /// Component label value for the workload's pods.
    pub fn component(&self) -> &'static str {
        match self {
            WorkloadKind::Ingress => "ingress",
            WorkloadKind::Executor => "executor",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a desired resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DesiredKey {
    /// Resource kind.
    pub kind: WorkloadKind,
    /// Tenant namespace.
    pub namespace: String,
    /// Resource name.
    pub name: String,
}

impl DesiredKey {
    /// Create a key.
    pub fn new(kind: WorkloadKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DesiredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A desired resource of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DesiredObject {
    /// Ingress of a bridge.
    Ingress(BridgeIngress),
    /// Executor of a processor.
    Executor(BridgeExecutor),
}

impl DesiredObject {
    /// Resource kind.
    pub fn kind(&self) -> WorkloadKind {
        match self {
            DesiredObject::Ingress(_) => WorkloadKind::Ingress,
            DesiredObject::Executor(_) => WorkloadKind::Executor,
        }
    }

    /// Resource identity.
    pub fn key(&self) -> DesiredKey {
        DesiredKey::new(
            self.kind(),
            self.meta().namespace.clone().unwrap_or_default(),
            self.meta().name.clone().unwrap_or_default(),
        )
    }

    /// Object metadata.
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            DesiredObject::Ingress(i) => i.meta(),
            DesiredObject::Executor(e) => e.meta(),
        }
    }

    /// Mutable object metadata.
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            DesiredObject::Ingress(i) => i.meta_mut(),
            DesiredObject::Executor(e) => e.meta_mut(),
        }
    }

    /// Resource name.
    pub fn name(&self) -> String {
        match self {
            DesiredObject::Ingress(i) => i.name_any(),
            DesiredObject::Executor(e) => e.name_any(),
        }
    }

    /// Current status, if any has been written.
    pub fn status(&self) -> Option<&WorkloadStatus> {
        match self {
            DesiredObject::Ingress(i) => i.status.as_ref(),
            DesiredObject::Executor(e) => e.status.as_ref(),
        }
    }

    /// Replace the status.
    pub fn set_status(&mut self, status: WorkloadStatus) {
        match self {
            DesiredObject::Ingress(i) => i.status = Some(status),
            DesiredObject::Executor(e) => e.status = Some(status),
        }
    }

    /// Whether the resource has been marked for deletion.
    pub fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// Controller owner reference pointing at this resource.
    ///
    /// `None` until the cluster has assigned a uid.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        match self {
            DesiredObject::Ingress(i) => i.controller_owner_ref(&()),
            DesiredObject::Executor(e) => e.controller_owner_ref(&()),
        }
    }

    /// Container image of the workload.
    pub fn image(&self) -> &str {
        match self {
            DesiredObject::Ingress(i) => &i.spec.image,
            DesiredObject::Executor(e) => &e.spec.image,
        }
    }

    /// Owning bridge id.
    pub fn bridge_id(&self) -> &str {
        match self {
            DesiredObject::Ingress(i) => &i.spec.bridge_id,
            DesiredObject::Executor(e) => &e.spec.bridge_id,
        }
    }

    /// Owning customer id.
    pub fn customer_id(&self) -> &str {
        match self {
            DesiredObject::Ingress(i) => &i.spec.customer_id,
            DesiredObject::Executor(e) => &e.spec.customer_id,
        }
    }

    /// Name of the tenant credential secret.
    ///
    /// The secret is named like the desired resource itself.
    pub fn secret_name(&self) -> String {
        self.name()
    }
}

impl From<BridgeIngress> for DesiredObject {
    fn from(ingress: BridgeIngress) -> Self {
        DesiredObject::Ingress(ingress)
    }
}

impl From<BridgeExecutor> for DesiredObject {
    fn from(executor: BridgeExecutor) -> Self {
        DesiredObject::Executor(executor)
    }
}
