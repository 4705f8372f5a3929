//! Common test utilities for lifecycle integration tests.
//!
//! The harness wires the lifecycle to an in-memory cluster and runs the
//! operator's reconciler against the same cluster, so a test can drive the
//! whole control loop one step at a time.

#![allow(dead_code)]

use bridge_core::{ClusterApi, MemoryCluster, MockClock, poll_until};
use bridge_manager::{
    Lifecycle, ManagerConfig, MemoryRecordStore, Phase, RecordStore, SweepReport, TenantRecord,
};
use bridge_operator::OperatorConfig;
use bridge_operator::controller::{ControllerContext, Reconciler};
use std::sync::Arc;
use std::time::Duration;

pub const CUSTOMER: &str = "acme";

pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub clock: Arc<MockClock>,
    pub store: Arc<MemoryRecordStore>,
    pub lifecycle: Arc<Lifecycle>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default(), Duration::from_secs(300))
    }

    pub fn with_config(config: ManagerConfig, deadline: Duration) -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.require_namespaces(true);
        let clock = Arc::new(MockClock::new());
        let store = Arc::new(MemoryRecordStore::new());

        let lifecycle = Arc::new(Lifecycle::new(
            store.clone(),
            cluster.clone(),
            clock.clone(),
            config,
        ));
        let operator_config = OperatorConfig::default().with_provisioning_deadline(deadline);
        let ctx = Arc::new(ControllerContext::new(
            cluster.clone(),
            clock.clone(),
            operator_config,
        ));

        Self {
            cluster,
            clock,
            store,
            lifecycle,
            reconciler: Reconciler::new(ctx),
        }
    }

    /// Reconcile every desired resource once, then sweep once.
    pub async fn step(&self) -> SweepReport {
        for key in self.cluster.desired_keys() {
            let _ = self.reconciler.reconcile_key(&key).await;
        }
        self.lifecycle.sweep().await
    }

    /// Step until the record reaches `phase`.
    pub async fn step_until(&self, id: &str, phase: Phase) -> TenantRecord {
        poll_until(Duration::from_millis(5), Duration::from_secs(2), move || async move {
            self.step().await;
            self.store.get(id).filter(|r| r.phase == phase)
        })
        .await
        .unwrap_or_else(|e| {
            panic!(
                "record {} never reached {}: {} (now {:?})",
                id,
                phase,
                e,
                self.store.get(id).map(|r| r.phase)
            )
        })
    }

    /// Step until the record is gone from the store.
    pub async fn step_until_removed(&self, id: &str) {
        poll_until(Duration::from_millis(5), Duration::from_secs(2), move || async move {
            self.step().await;
            self.store.get(id).is_none().then_some(())
        })
        .await
        .unwrap_or_else(|e| panic!("record {} was never removed: {}", id, e));
    }

    /// Provide the credential secret the record's workload needs.
    pub fn put_secret(&self, record: &TenantRecord) {
        let key = record.desired_key();
        self.cluster.put_secret(&key.namespace, &key.name);
    }

    /// Report the record's Deployment as available.
    pub fn make_available(&self, record: &TenantRecord) {
        let key = record.desired_key();
        self.cluster
            .mark_deployment_available(&key.namespace, &key.name)
            .unwrap();
    }

    /// Report a replica failure on the record's Deployment.
    pub fn fail_replicas(&self, record: &TenantRecord) {
        let key = record.desired_key();
        self.cluster
            .mark_replica_failure(&key.namespace, &key.name)
            .unwrap();
    }

    /// Create a bridge and drive it to Ready.
    pub async fn ready_bridge(&self, name: &str) -> TenantRecord {
        let bridge = self.lifecycle.create_bridge(CUSTOMER, name).await.unwrap();
        self.provision(&bridge).await
    }

    /// Drive an accepted record to Ready.
    pub async fn provision(&self, record: &TenantRecord) -> TenantRecord {
        self.put_secret(record);
        self.step_until(&record.id, Phase::Provisioning).await;
        self.wait_for_deployment(record).await;
        self.make_available(record);
        self.step_until(&record.id, Phase::Ready).await
    }

    /// Step until the operator has created the record's Deployment.
    pub async fn wait_for_deployment(&self, record: &TenantRecord) {
        let key = &record.desired_key();
        poll_until(Duration::from_millis(5), Duration::from_secs(2), move || async move {
            self.step().await;
            self.cluster
                .get_deployment(&key.namespace, &key.name)
                .await
                .ok()
                .flatten()
                .map(|_| ())
        })
        .await
        .unwrap_or_else(|e| panic!("deployment of {} never appeared: {}", record.id, e));
    }
}
