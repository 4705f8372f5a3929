//! Tenant lifecycle operations.
//!
//! The [`Lifecycle`] owns tenant records. Requests are answered from the
//! record store alone: creating or deleting a record submits or deletes its
//! desired resource in the background, and the [`sweep`](crate::sweep) moves
//! records forward by reading desired-resource status back.
//!
//! ```text
//! Accepted ──► Provisioning ──► Ready
//!     │              │            │
//!     └──────────────┴──► Failed  │
//!                                 ▼
//!  (any visible) ──► DeletionRequested ──► Deleted (record removed)
//! ```

use crate::actions::ActionValidators;
use crate::config::ManagerConfig;
use crate::error::{LifecycleError, LifecycleResult, StoreError};
use crate::model::{Phase, ProcessorRequest, RecordKind, TenantRecord};
use crate::store::RecordStore;
use bridge_core::crd::{BridgeExecutor, BridgeExecutorSpec, BridgeIngress, BridgeIngressSpec};
use bridge_core::naming::{COMPONENT_LABEL, INSTANCE_LABEL};
use bridge_core::{ClusterApi, ClusterError, ClusterResult, Clock, DesiredObject};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, warn};

/// Attempts at a versioned record update before giving up.
const UPDATE_ATTEMPTS: usize = 3;

/// Tenant lifecycle state machine.
pub struct Lifecycle {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) cluster: Arc<dyn ClusterApi>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) validators: Arc<ActionValidators>,
    pub(crate) config: ManagerConfig,
}

impl Lifecycle {
    /// Create a lifecycle with the built-in action validators.
    pub fn new(
        store: Arc<dyn RecordStore>,
        cluster: Arc<dyn ClusterApi>,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            cluster,
            clock,
            validators: Arc::new(ActionValidators::builtin()),
            config,
        }
    }

    /// Replace the action validator table.
    pub fn with_validators(mut self, validators: ActionValidators) -> Self {
        self.validators = Arc::new(validators);
        self
    }

    /// Manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Create a bridge.
    ///
    /// Fails with [`LifecycleError::Conflict`] if the customer already has a
    /// bridge with this name; nothing is submitted in that case.
    pub async fn create_bridge(
        &self,
        customer_id: &str,
        name: &str,
    ) -> LifecycleResult<TenantRecord> {
        if self.store.find_by_name(customer_id, None, name).is_some() {
            return Err(LifecycleError::Conflict(format!(
                "bridge '{}' already exists",
                name
            )));
        }

        let record = self
            .store
            .insert(TenantRecord::bridge(customer_id, name, self.clock.now()))?;
        info!(
            bridge_id = %record.id,
            customer_id = %customer_id,
            name = %name,
            "Bridge accepted"
        );

        self.submit_in_background(&record)?;
        Ok(record)
    }

    /// Create a processor on a ready bridge.
    pub async fn create_processor(
        &self,
        customer_id: &str,
        bridge_id: &str,
        request: ProcessorRequest,
    ) -> LifecycleResult<TenantRecord> {
        let bridge = self.visible(customer_id, bridge_id, RecordKind::Bridge)?;
        if bridge.phase != Phase::Ready {
            return Err(LifecycleError::BridgeNotReady(bridge.id));
        }

        self.validators
            .validate(&request.definition.action)
            .map_err(|e| LifecycleError::InvalidAction(e.to_string()))?;

        if self
            .store
            .find_by_name(customer_id, Some(bridge_id), &request.name)
            .is_some()
        {
            return Err(LifecycleError::Conflict(format!(
                "processor '{}' already exists on bridge {}",
                request.name, bridge_id
            )));
        }

        let record = self.store.insert(TenantRecord::processor(
            customer_id,
            bridge_id,
            request,
            self.clock.now(),
        ))?;
        info!(
            processor_id = %record.id,
            bridge_id = %bridge_id,
            name = %record.name,
            "Processor accepted"
        );

        self.submit_in_background(&record)?;
        Ok(record)
    }

    /// Get a visible record of the customer.
    pub fn get(&self, customer_id: &str, id: &str) -> LifecycleResult<TenantRecord> {
        self.store
            .get(id)
            .filter(|r| r.customer_id == customer_id && r.is_visible())
            .ok_or_else(|| LifecycleError::NotFound {
                kind: "Resource",
                id: id.to_string(),
            })
    }

    /// Visible records of the customer, oldest first.
    pub fn list(&self, customer_id: &str) -> Vec<TenantRecord> {
        self.store
            .list_by_customer(customer_id)
            .into_iter()
            .filter(TenantRecord::is_visible)
            .collect()
    }

    /// Visible processors of one of the customer's bridges.
    pub fn list_processors(
        &self,
        customer_id: &str,
        bridge_id: &str,
    ) -> LifecycleResult<Vec<TenantRecord>> {
        self.visible(customer_id, bridge_id, RecordKind::Bridge)?;
        Ok(self
            .store
            .list_by_bridge(bridge_id)
            .into_iter()
            .filter(|r| r.customer_id == customer_id && r.is_visible())
            .collect())
    }

    /// Ingress endpoint of a ready bridge.
    pub fn bridge_endpoint(&self, customer_id: &str, bridge_id: &str) -> LifecycleResult<String> {
        let bridge = self.visible(customer_id, bridge_id, RecordKind::Bridge)?;
        match (bridge.phase, bridge.endpoint) {
            (Phase::Ready, Some(endpoint)) => Ok(endpoint),
            _ => Err(LifecycleError::BridgeNotReady(bridge.id)),
        }
    }

    /// Request deletion of a bridge or processor.
    ///
    /// The record disappears from tenant views immediately; the sweep removes
    /// it once its workload is gone.
    pub async fn delete(&self, customer_id: &str, id: &str) -> LifecycleResult<TenantRecord> {
        let record = self.get(customer_id, id)?;

        if record.kind == RecordKind::Bridge {
            let count = self.store.list_by_bridge(id).len();
            if count > 0 {
                return Err(LifecycleError::HasProcessors {
                    bridge_id: id.to_string(),
                    count,
                });
            }
        }

        let updated = self.update_record(id, |r| {
            if !r.is_visible() {
                return false;
            }
            r.phase = Phase::DeletionRequested;
            true
        })?;
        let Some(updated) = updated else {
            return Err(LifecycleError::NotFound {
                kind: "Resource",
                id: id.to_string(),
            });
        };
        info!(id = %id, kind = %updated.kind, "Deletion requested");

        self.delete_in_background(&updated);
        Ok(updated)
    }

    /// Desired resource backing a record.
    pub fn desired_object(&self, record: &TenantRecord) -> LifecycleResult<DesiredObject> {
        let key = record.desired_key();
        let labels = BTreeMap::from([
            (INSTANCE_LABEL.to_string(), key.name.clone()),
            (
                COMPONENT_LABEL.to_string(),
                key.kind.component().to_string(),
            ),
        ]);

        let mut desired = match record.kind {
            RecordKind::Bridge => DesiredObject::Ingress(BridgeIngress::new(
                &key.name,
                BridgeIngressSpec {
                    image: self.config.ingress_image.clone(),
                    bridge_id: record.id.clone(),
                    customer_id: record.customer_id.clone(),
                    bridge_name: record.name.clone(),
                },
            )),
            RecordKind::Processor => {
                let definition = record.definition.as_ref().ok_or_else(|| {
                    LifecycleError::Serialization(format!(
                        "processor {} has no definition",
                        record.id
                    ))
                })?;
                DesiredObject::Executor(BridgeExecutor::new(
                    &key.name,
                    BridgeExecutorSpec {
                        image: self.config.executor_image.clone(),
                        bridge_id: record.owning_bridge_id().to_string(),
                        customer_id: record.customer_id.clone(),
                        processor_id: record.id.clone(),
                        processor_name: record.name.clone(),
                        definition: serde_json::to_string(definition)?,
                    },
                ))
            }
        };

        let meta = desired.meta_mut();
        meta.namespace = Some(key.namespace);
        meta.labels = Some(labels);
        Ok(desired)
    }

    /// Apply `change` to the stored record, retrying on version conflicts.
    ///
    /// `change` returns `false` to leave the record alone. Returns `None` if
    /// the record is gone or `change` declined.
    pub(crate) fn update_record(
        &self,
        id: &str,
        change: impl Fn(&mut TenantRecord) -> bool,
    ) -> LifecycleResult<Option<TenantRecord>> {
        let mut last_error = None;
        for _ in 0..UPDATE_ATTEMPTS {
            let Some(mut record) = self.store.get(id) else {
                return Ok(None);
            };
            if !change(&mut record) {
                return Ok(None);
            }
            match self.store.update(record) {
                Ok(updated) => return Ok(Some(updated)),
                Err(err @ StoreError::VersionConflict { .. }) => {
                    debug!(id = %id, error = %err, "Record changed concurrently, retrying");
                    last_error = Some(err);
                }
                Err(StoreError::NotFound(_)) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
        Err(last_error
            .map(LifecycleError::from)
            .unwrap_or_else(|| LifecycleError::Conflict(format!("record {} is contended", id))))
    }

    /// Run `call` bounded by the configured call timeout.
    pub(crate) async fn bounded<T>(
        &self,
        call: impl Future<Output = ClusterResult<T>>,
    ) -> ClusterResult<T> {
        bounded(self.config.call_timeout, call).await
    }

    fn visible(
        &self,
        customer_id: &str,
        id: &str,
        kind: RecordKind,
    ) -> LifecycleResult<TenantRecord> {
        self.store
            .get(id)
            .filter(|r| r.kind == kind && r.customer_id == customer_id && r.is_visible())
            .ok_or_else(|| LifecycleError::NotFound {
                kind: kind.as_str(),
                id: id.to_string(),
            })
    }

    fn submit_in_background(&self, record: &TenantRecord) -> LifecycleResult<()> {
        let desired = self.desired_object(record)?;
        let cluster = self.cluster.clone();
        let limit = self.config.call_timeout;
        let span = bridge_core::lifecycle_span!("submit", record.id);

        tokio::spawn(
            async move {
                let key = desired.key();
                match bounded(limit, cluster.submit_desired(desired)).await {
                    Ok(()) => debug!(key = %key, "Desired resource submitted"),
                    Err(e) => warn!(
                        key = %key,
                        error = %e,
                        "Submitting desired resource failed, the sweep will retry"
                    ),
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    fn delete_in_background(&self, record: &TenantRecord) {
        let key = record.desired_key();
        let cluster = self.cluster.clone();
        let limit = self.config.call_timeout;
        let span = bridge_core::lifecycle_span!("delete", record.id);

        tokio::spawn(
            async move {
                match bounded(limit, cluster.delete_desired(&key)).await {
                    Ok(()) => debug!(key = %key, "Desired resource deleted"),
                    Err(e) => warn!(
                        key = %key,
                        error = %e,
                        "Deleting desired resource failed, the sweep will retry"
                    ),
                }
            }
            .instrument(span),
        );
    }
}

pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = ClusterResult<T>>,
) -> ClusterResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ClusterError::Timeout(limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BaseAction, ProcessorDefinition};
    use crate::store::MemoryRecordStore;
    use bridge_core::{MemoryCluster, MockClock, WorkloadKind};

    fn lifecycle() -> (Lifecycle, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        let lifecycle = Lifecycle::new(
            store.clone(),
            Arc::new(MemoryCluster::new()),
            Arc::new(MockClock::new()),
            ManagerConfig::default(),
        );
        (lifecycle, store)
    }

    fn kafka(name: &str) -> ProcessorRequest {
        ProcessorRequest {
            name: name.to_string(),
            definition: ProcessorDefinition::with_action(BaseAction::new(
                "KafkaTopicAction",
                [("topic", "orders")],
            )),
        }
    }

    fn make_ready(store: &MemoryRecordStore, id: &str) {
        let mut record = store.get(id).unwrap();
        record.phase = Phase::Ready;
        record.endpoint = Some("http://ob-b.ob-acme.svc.cluster.local:8080".to_string());
        store.update(record).unwrap();
    }

    #[tokio::test]
    async fn ingress_object_carries_the_bridge() {
        let (lifecycle, _) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();

        let desired = lifecycle.desired_object(&bridge).unwrap();
        assert_eq!(desired.kind(), WorkloadKind::Ingress);
        assert_eq!(desired.key(), bridge.desired_key());
        assert_eq!(desired.bridge_id(), bridge.id);
        assert_eq!(desired.customer_id(), "acme");
        assert_eq!(desired.image(), lifecycle.config().ingress_image);
    }

    #[tokio::test]
    async fn executor_object_carries_the_definition() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();
        make_ready(&store, &bridge.id);

        let processor = lifecycle
            .create_processor("acme", &bridge.id, kafka("to-kafka"))
            .await
            .unwrap();
        let DesiredObject::Executor(executor) = lifecycle.desired_object(&processor).unwrap()
        else {
            panic!("expected an executor");
        };
        assert_eq!(executor.spec.bridge_id, bridge.id);
        assert_eq!(executor.spec.processor_id, processor.id);
        let definition: ProcessorDefinition =
            serde_json::from_str(&executor.spec.definition).unwrap();
        assert_eq!(definition.action.action_type, "KafkaTopicAction");
    }

    #[tokio::test]
    async fn duplicate_bridge_name_conflicts() {
        let (lifecycle, store) = lifecycle();
        lifecycle.create_bridge("acme", "orders").await.unwrap();

        let err = lifecycle.create_bridge("acme", "orders").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn processor_needs_ready_bridge() {
        let (lifecycle, _) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();

        let err = lifecycle
            .create_processor("acme", &bridge.id, kafka("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::BridgeNotReady(_)));

        let err = lifecycle
            .create_processor("globex", &bridge.id, kafka("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn processor_action_is_validated() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();
        make_ready(&store, &bridge.id);

        let mut request = kafka("p");
        request.definition.action = BaseAction::new("KafkaTopicAction", [("topic", "")]);
        let err = lifecycle
            .create_processor("acme", &bridge.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidAction(_)));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn processor_names_are_unique_per_bridge() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();
        make_ready(&store, &bridge.id);

        lifecycle
            .create_processor("acme", &bridge.id, kafka("p"))
            .await
            .unwrap();
        let err = lifecycle
            .create_processor("acme", &bridge.id, kafka("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_hides_the_record() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();

        let deleted = lifecycle.delete("acme", &bridge.id).await.unwrap();
        assert_eq!(deleted.phase, Phase::DeletionRequested);
        assert!(matches!(
            lifecycle.get("acme", &bridge.id),
            Err(LifecycleError::NotFound { .. })
        ));
        assert!(lifecycle.list("acme").is_empty());
        assert_eq!(store.count(), 1);

        let again = lifecycle.delete("acme", &bridge.id).await.unwrap_err();
        assert!(matches!(again, LifecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn bridge_with_processors_cannot_be_deleted() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();
        make_ready(&store, &bridge.id);
        lifecycle
            .create_processor("acme", &bridge.id, kafka("p"))
            .await
            .unwrap();

        let err = lifecycle.delete("acme", &bridge.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::HasProcessors { count: 1, .. }));
    }

    #[tokio::test]
    async fn endpoint_requires_ready_bridge() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();
        assert!(matches!(
            lifecycle.bridge_endpoint("acme", &bridge.id),
            Err(LifecycleError::BridgeNotReady(_))
        ));

        make_ready(&store, &bridge.id);
        let endpoint = lifecycle.bridge_endpoint("acme", &bridge.id).unwrap();
        assert!(endpoint.starts_with("http://"));
    }

    #[tokio::test]
    async fn update_record_bumps_version_or_declines() {
        let (lifecycle, store) = lifecycle();
        let bridge = lifecycle.create_bridge("acme", "orders").await.unwrap();

        let updated = lifecycle
            .update_record(&bridge.id, |r| {
                r.phase = Phase::Provisioning;
                true
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, 2);

        let declined = lifecycle.update_record(&bridge.id, |_| false).unwrap();
        assert!(declined.is_none());
        assert_eq!(store.get(&bridge.id).unwrap().version, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_calls_time_out() {
        let result: ClusterResult<()> = bounded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ClusterError::Timeout(50))));
    }
}
