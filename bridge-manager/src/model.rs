//! Tenant records and processor definitions.

use bridge_core::naming::{customer_namespace, executor_name, ingress_name};
use bridge_core::{DesiredKey, WorkloadKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Tenant-visible lifecycle stage of a bridge or processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Request stored, workload not yet observed.
    Accepted,
    /// Workload submitted and rolling out.
    Provisioning,
    /// Workload available.
    Ready,
    /// Workload failed; terminal.
    Failed,
    /// Tenant asked for deletion; waiting for the workload to disappear.
    DeletionRequested,
    /// Workload gone; terminal.
    Deleted,
}

impl Phase {
    /// Phases the sweep never revisits.
    pub const TERMINAL: [Phase; 2] = [Phase::Failed, Phase::Deleted];

    /// Phases the sweep drives forward.
    pub const ACTIVE: [Phase; 4] = [
        Phase::Accepted,
        Phase::Provisioning,
        Phase::Ready,
        Phase::DeletionRequested,
    ];

    /// Whether the sweep leaves records in this phase alone.
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Whether tenants can see records in this phase.
    pub fn is_visible(&self) -> bool {
        !matches!(self, Phase::DeletionRequested | Phase::Deleted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Accepted => "ACCEPTED",
            Phase::Provisioning => "PROVISIONING",
            Phase::Ready => "READY",
            Phase::Failed => "FAILED",
            Phase::DeletionRequested => "DELETION_REQUESTED",
            Phase::Deleted => "DELETED",
        };
        write!(f, "{}", s)
    }
}

/// What a tenant record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    /// A bridge, backed by a `BridgeIngress`.
    Bridge,
    /// A processor of a bridge, backed by a `BridgeExecutor`.
    Processor,
}

impl RecordKind {
    /// Human readable kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Bridge => "Bridge",
            RecordKind::Processor => "Processor",
        }
    }

    /// Kind of the desired resource backing records of this kind.
    pub fn workload_kind(&self) -> WorkloadKind {
        match self {
            RecordKind::Bridge => WorkloadKind::Ingress,
            RecordKind::Processor => WorkloadKind::Executor,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action a processor sends matching events to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAction {
    /// Type tag selecting the validator.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Type-specific parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

impl BaseAction {
    /// Create an action with parameters.
    pub fn new<K, V>(
        action_type: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            action_type: action_type.into(),
            parameters: Some(
                parameters
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

/// What a processor does with the events of its bridge.
///
/// Filters and template are opaque to the control plane; they are carried to
/// the executor as part of its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorDefinition {
    /// Event filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<serde_json::Value>,
    /// Transformation applied before the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_template: Option<String>,
    /// Where matching events go.
    pub action: BaseAction,
}

impl ProcessorDefinition {
    /// Definition with only an action.
    pub fn with_action(action: BaseAction) -> Self {
        Self {
            filters: Vec::new(),
            transformation_template: None,
            action,
        }
    }
}

/// A tenant request to create a processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorRequest {
    /// Processor name, unique within its bridge.
    pub name: String,
    /// Processor definition.
    #[serde(flatten)]
    pub definition: ProcessorDefinition,
}

/// A bridge or processor as the tenant sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    /// Record id.
    pub id: String,
    /// Bridge or processor.
    pub kind: RecordKind,
    /// Tenant-chosen name.
    pub name: String,
    /// Owning customer.
    pub customer_id: String,
    /// Parent bridge of a processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_id: Option<String>,
    /// Lifecycle stage.
    pub phase: Phase,
    /// When the tenant request was stored.
    pub submitted_at: DateTime<Utc>,
    /// When the record first became ready.
    pub published_at: Option<DateTime<Utc>>,
    /// Ingress endpoint of a ready bridge.
    pub endpoint: Option<String>,
    /// Processor definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<ProcessorDefinition>,
    /// Optimistic concurrency version, assigned by the store.
    pub version: u64,
}

impl TenantRecord {
    /// A freshly accepted bridge.
    pub fn bridge(
        customer_id: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: RecordKind::Bridge,
            name: name.into(),
            customer_id: customer_id.into(),
            bridge_id: None,
            phase: Phase::Accepted,
            submitted_at: now,
            published_at: None,
            endpoint: None,
            definition: None,
            version: 0,
        }
    }

    /// A freshly accepted processor of `bridge_id`.
    pub fn processor(
        customer_id: impl Into<String>,
        bridge_id: impl Into<String>,
        request: ProcessorRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: RecordKind::Processor,
            name: request.name,
            customer_id: customer_id.into(),
            bridge_id: Some(bridge_id.into()),
            phase: Phase::Accepted,
            submitted_at: now,
            published_at: None,
            endpoint: None,
            definition: Some(request.definition),
            version: 0,
        }
    }

    /// Id of the bridge this record belongs to; its own id for a bridge.
    pub fn owning_bridge_id(&self) -> &str {
        self.bridge_id.as_deref().unwrap_or(&self.id)
    }

    /// Tenant namespace of the backing workload.
    pub fn namespace(&self) -> String {
        customer_namespace(&self.customer_id)
    }

    /// Name of the backing desired resource.
    pub fn resource_name(&self) -> String {
        match self.kind {
            RecordKind::Bridge => ingress_name(&self.id),
            RecordKind::Processor => executor_name(&self.id),
        }
    }

    /// Key of the backing desired resource.
    pub fn desired_key(&self) -> DesiredKey {
        DesiredKey::new(self.kind.workload_kind(), self.namespace(), self.resource_name())
    }

    /// Whether tenants can see this record.
    pub fn is_visible(&self) -> bool {
        self.phase.is_visible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Deleted.is_terminal());
        assert!(!Phase::DeletionRequested.is_terminal());
        assert!(!Phase::Ready.is_terminal());
        assert!(Phase::ACTIVE.iter().all(|p| !p.is_terminal()));
    }

    #[test]
    fn deletion_hides_records() {
        assert!(Phase::Failed.is_visible());
        assert!(!Phase::DeletionRequested.is_visible());
        assert!(!Phase::Deleted.is_visible());
    }

    #[test]
    fn new_bridge_is_accepted_without_endpoint() {
        let bridge = TenantRecord::bridge("acme", "orders", Utc::now());
        assert_eq!(bridge.phase, Phase::Accepted);
        assert!(bridge.endpoint.is_none());
        assert!(bridge.published_at.is_none());
        assert_eq!(bridge.owning_bridge_id(), bridge.id);
    }

    #[test]
    fn desired_key_follows_naming() {
        let bridge = TenantRecord::bridge("Acme", "orders", Utc::now());
        let key = bridge.desired_key();
        assert_eq!(key.kind, WorkloadKind::Ingress);
        assert_eq!(key.namespace, "ob-acme");
        assert_eq!(key.name, format!("ob-{}", bridge.id));
    }

    #[test]
    fn processor_request_flattens_definition() {
        let request: ProcessorRequest = serde_json::from_value(serde_json::json!({
            "name": "to-kafka",
            "transformationTemplate": "{data.id}",
            "action": {"type": "KafkaTopicAction", "parameters": {"topic": "orders"}}
        }))
        .unwrap();
        assert_eq!(request.name, "to-kafka");
        assert_eq!(request.definition.action.action_type, "KafkaTopicAction");
        assert!(request.definition.filters.is_empty());

        let processor = TenantRecord::processor("acme", "b-1", request, Utc::now());
        assert_eq!(processor.owning_bridge_id(), "b-1");
        assert_eq!(processor.desired_key().kind, WorkloadKind::Executor);
    }

    #[test]
    fn phase_serializes_upper_case() {
        let json = serde_json::to_value(Phase::DeletionRequested).unwrap();
        assert_eq!(json, "DELETION_REQUESTED");
        assert_eq!(Phase::DeletionRequested.to_string(), "DELETION_REQUESTED");
    }
}
