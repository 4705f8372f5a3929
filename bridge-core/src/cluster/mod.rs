//! Cluster access layer.
//!
//! Both the operator and the manager talk to the orchestrator exclusively
//! through [`ClusterApi`]. Two backends are provided:
//!
//! - [`KubeCluster`]: a live Kubernetes API server via `kube`
//! - [`MemoryCluster`]: an in-process cluster for tests and local runs
//!
//! # Example
//!
//! ```ignore
//! use bridge_core::cluster::{ClusterApi, MemoryCluster};
//! use std::sync::Arc;
//!
//! let cluster: Arc<dyn ClusterApi> = Arc::new(MemoryCluster::new());
//! let secret = cluster.get_secret("ob-customer", "ob-bridge").await?;
//! ```

mod kubernetes;
mod memory;

pub use kubernetes::{DEFAULT_FIELD_MANAGER, KubeCluster};
pub use memory::MemoryCluster;

use crate::crd::{DesiredKey, DesiredObject, WorkloadStatus};
use crate::error::ClusterResult;
use crate::naming::{MANAGED_BY, MANAGED_BY_LABEL};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Type alias for async cluster futures.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = ClusterResult<T>> + Send + 'a>>;

/// Trait for cluster backends.
///
/// # Implementation Notes
///
/// - Lookups return `Ok(None)` for absent objects rather than an error
/// - Deletes of absent objects succeed
/// - `replace_*` must honour `metadata.resourceVersion` and fail with
///   [`ClusterError::Conflict`](crate::ClusterError::Conflict) when it is stale
/// - Owned Deployments and Services are removed by the backend when their
///   owning desired resource goes away
/// - `submit_desired` creates the resource's namespace if it does not exist
pub trait ClusterApi: Send + Sync {
    /// Create a desired resource.
    ///
    /// Submitting a resource whose key already exists is a no-op, so the call
    /// can be repeated safely.
    fn submit_desired(&self, desired: DesiredObject) -> ClusterFuture<'_, ()>;

    /// Fetch a desired resource.
    fn get_desired<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, Option<DesiredObject>>;

    /// Delete a desired resource.
    fn delete_desired<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, ()>;

    /// Replace the status subresource of a desired resource.
    fn patch_desired_status<'a>(
        &'a self,
        key: &'a DesiredKey,
        status: WorkloadStatus,
    ) -> ClusterFuture<'a, ()>;

    /// Fetch a secret.
    fn get_secret<'a>(&'a self, namespace: &'a str, name: &'a str)
    -> ClusterFuture<'a, Option<Secret>>;

    /// Fetch a deployment.
    fn get_deployment<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Deployment>>;

    /// Create a deployment in its metadata namespace.
    fn create_deployment(&self, deployment: Deployment) -> ClusterFuture<'_, Deployment>;

    /// Replace a deployment, guarded by its resource version.
    fn replace_deployment(&self, deployment: Deployment) -> ClusterFuture<'_, Deployment>;

    /// Delete a deployment.
    fn delete_deployment<'a>(&'a self, namespace: &'a str, name: &'a str) -> ClusterFuture<'a, ()>;

    /// Fetch a service.
    fn get_service<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Service>>;

    /// Create a service in its metadata namespace.
    fn create_service(&self, service: Service) -> ClusterFuture<'_, Service>;

    /// Replace a service, guarded by its resource version.
    fn replace_service(&self, service: Service) -> ClusterFuture<'_, Service>;

    /// Delete a service.
    fn delete_service<'a>(&'a self, namespace: &'a str, name: &'a str) -> ClusterFuture<'a, ()>;

    /// Whether any object owned by the desired resource still exists.
    fn owned_objects_remaining<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, bool>;

    /// Status of a desired resource, `None` if the resource is absent or has
    /// no status yet.
    fn desired_status<'a>(
        &'a self,
        key: &'a DesiredKey,
    ) -> ClusterFuture<'a, Option<WorkloadStatus>> {
        Box::pin(async move {
            Ok(self
                .get_desired(key)
                .await?
                .and_then(|desired| desired.status().cloned()))
        })
    }
}

/// Tenant namespace as created on first submission.
pub fn tenant_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY.to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}
