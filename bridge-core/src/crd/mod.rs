//! Custom Resource Definitions for desired bridge workloads.
//!
//! Each tenant bridge is backed by one [`BridgeIngress`] and each processor by
//! one [`BridgeExecutor`]. The manager creates these objects, the operator
//! reconciles them into Deployments and Services and reports readiness back
//! through a shared [`WorkloadStatus`].

mod desired;
mod executor;
mod ingress;

pub use desired::{DesiredKey, DesiredObject, WorkloadKind, WorkloadStatus};
pub use executor::{BridgeExecutor, BridgeExecutorSpec, DEFAULT_EXECUTOR_IMAGE};
pub use ingress::{BridgeIngress, BridgeIngressSpec, DEFAULT_INGRESS_IMAGE};

/// API group of the bridge custom resources.
pub const API_GROUP: &str = "smartevents.io";

/// API version of the bridge custom resources.
pub const API_VERSION: &str = "v1alpha1";
