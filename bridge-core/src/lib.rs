//! Event Bridge Core Library
//!
//! This crate provides the types shared by the bridge operator and the bridge
//! manager: the readiness condition model, the custom resources that describe
//! a desired workload, and the cluster access layer both halves talk through.
//!
//! # Key Components
//!
//! - **Condition**: Typed readiness signals with monotonic transition times
//! - **CRDs**: `BridgeIngress` and `BridgeExecutor` desired resources
//! - **Cluster**: The [`ClusterApi`] seam with kube-backed and in-memory backends
//! - **Retry**: Bounded polling for "wait until" checks
//! - **Clock**: Time abstraction so transition times are testable
//!
//! # Example
//!
//! ```ignore
//! use bridge_core::prelude::*;
//!
//! let cluster = MemoryCluster::new();
//! cluster.submit_desired(DesiredObject::Ingress(ingress)).await?;
//!
//! if let Some(status) = cluster.desired_status(&key).await? {
//!     println!("ready: {}", status.is_ready());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod cluster;
pub mod condition;
pub mod crd;
pub mod error;
pub mod naming;
pub mod observability;
pub mod prelude;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use cluster::{ClusterApi, ClusterFuture, KubeCluster, MemoryCluster};
pub use condition::{Condition, ConditionReason, ConditionStatus, ConditionType};
pub use crd::{
    BridgeExecutor, BridgeExecutorSpec, BridgeIngress, BridgeIngressSpec, DesiredKey,
    DesiredObject, WorkloadKind, WorkloadStatus,
};
pub use error::{ClusterError, ClusterResult};
pub use retry::{RetryTimeout, poll_until};
