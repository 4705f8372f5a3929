//! Convenient re-exports for bridge crates.

pub use crate::clock::{Clock, MockClock, SystemClock};
pub use crate::cluster::{ClusterApi, KubeCluster, MemoryCluster};
pub use crate::condition::{
    Condition, ConditionReason, ConditionStatus, ConditionType, find_by_type, overall_ready,
    set_condition,
};
pub use crate::crd::{
    BridgeExecutor, BridgeExecutorSpec, BridgeIngress, BridgeIngressSpec, DesiredKey,
    DesiredObject, WorkloadKind, WorkloadStatus,
};
pub use crate::error::{ClusterError, ClusterResult};
pub use crate::retry::{RetryTimeout, poll_until};
