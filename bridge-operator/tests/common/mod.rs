//! Common test utilities for reconciler integration tests.

#![allow(dead_code)]

use bridge_core::crd::{BridgeExecutor, BridgeExecutorSpec, BridgeIngress, BridgeIngressSpec};
use bridge_core::{ClusterApi, DesiredKey, DesiredObject, MemoryCluster, MockClock};
use bridge_operator::controller::{ControllerContext, Reconciler};
use bridge_operator::OperatorConfig;
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "ob-acme";

/// Reconciler wired to an in-memory cluster and a mock clock.
pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub clock: Arc<MockClock>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_deadline(Duration::from_secs(300))
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.require_namespaces(true);
        let clock = Arc::new(MockClock::new());
        let config = OperatorConfig::default().with_provisioning_deadline(deadline);
        let ctx = Arc::new(ControllerContext::new(cluster.clone(), clock.clone(), config));
        Self {
            cluster,
            clock,
            reconciler: Reconciler::new(ctx),
        }
    }

    /// Submit a desired resource and return its key.
    pub async fn submit(&self, desired: DesiredObject) -> DesiredKey {
        let key = desired.key();
        self.cluster.submit_desired(desired).await.unwrap();
        key
    }

    pub fn put_secret(&self, key: &DesiredKey) {
        self.cluster.put_secret(&key.namespace, &key.name);
    }
}

pub fn ingress(bridge_id: &str) -> DesiredObject {
    let mut ingress = BridgeIngress::new(
        &format!("ob-{}", bridge_id),
        BridgeIngressSpec {
            image: "ingress:1".to_string(),
            bridge_id: bridge_id.to_string(),
            customer_id: "acme".to_string(),
            bridge_name: format!("bridge-{}", bridge_id),
        },
    );
    ingress.metadata.namespace = Some(NAMESPACE.to_string());
    DesiredObject::Ingress(ingress)
}

pub fn executor(processor_id: &str) -> DesiredObject {
    let mut executor = BridgeExecutor::new(
        &format!("ob-{}", processor_id),
        BridgeExecutorSpec {
            image: "executor:1".to_string(),
            bridge_id: "b1".to_string(),
            customer_id: "acme".to_string(),
            processor_id: processor_id.to_string(),
            processor_name: format!("processor-{}", processor_id),
            definition: r#"{"action":{"type":"KafkaTopicAction","parameters":{"topic":"t"}}}"#
                .to_string(),
        },
    );
    executor.metadata.namespace = Some(NAMESPACE.to_string());
    DesiredObject::Executor(executor)
}
