//! In-memory cluster backend.
//!
//! Keeps every object in process. Resource versions are enforced on replace
//! and owner references are honoured when a desired resource is deleted, so
//! reconciler and lifecycle logic behave the same as against a live API
//! server. Test helpers drive Deployment rollout conditions directly.
//!
//! Submitting a desired resource creates its namespace. By default workloads
//! may be created in any namespace; [`MemoryCluster::require_namespaces`]
//! makes creates into unknown namespaces fail the way an API server does.

use super::{ClusterApi, ClusterFuture, tenant_namespace};
use crate::crd::{DesiredKey, DesiredObject, WorkloadStatus};
use crate::error::{ClusterError, ClusterResult};
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

type ObjectKey = (String, String);

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    desired: BTreeMap<DesiredKey, DesiredObject>,
    secrets: BTreeMap<ObjectKey, Secret>,
    deployments: BTreeMap<ObjectKey, Deployment>,
    services: BTreeMap<ObjectKey, Service>,
    next_version: u64,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn ensure_namespace(&mut self, name: &str) {
        if !self.namespaces.contains_key(name) {
            let mut namespace = tenant_namespace(name);
            namespace.metadata.resource_version = Some(self.bump());
            self.namespaces.insert(name.to_string(), namespace);
        }
    }
}

/// In-memory cluster.
///
/// All state is lost when dropped.
pub struct MemoryCluster {
    state: Mutex<State>,
    /// Keys whose desired-resource calls fail with `Unavailable`.
    failing: Mutex<HashSet<DesiredKey>>,
    /// Artificial delay applied to every call.
    latency: Mutex<Duration>,
    /// Whether every call fails with `Unavailable`.
    unavailable: AtomicBool,
    /// Whether owned objects survive their owner until `collect_garbage`.
    deferred_gc: AtomicBool,
    /// Whether creates into unknown namespaces fail.
    namespaces_required: AtomicBool,
    /// Mutating calls on Deployments and Services.
    workload_writes: AtomicUsize,
    /// Status patches on desired resources.
    status_patches: AtomicUsize,
}

impl MemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            failing: Mutex::new(HashSet::new()),
            latency: Mutex::new(Duration::ZERO),
            unavailable: AtomicBool::new(false),
            deferred_gc: AtomicBool::new(false),
            namespaces_required: AtomicBool::new(false),
            workload_writes: AtomicUsize::new(0),
            status_patches: AtomicUsize::new(0),
        }
    }

    /// Reject Deployment and Service creates into namespaces that were never
    /// created.
    pub fn require_namespaces(&self, required: bool) {
        self.namespaces_required.store(required, Ordering::SeqCst);
    }

    /// A namespace, if it exists.
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().namespaces.get(name).cloned()
    }

    /// Store a tenant secret.
    pub fn put_secret(&self, namespace: &str, name: &str) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .lock()
            .secrets
            .insert((namespace.to_string(), name.to_string()), secret);
    }

    /// Remove a tenant secret.
    pub fn remove_secret(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .secrets
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Report the deployment as available and progressing.
    pub fn mark_deployment_available(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.set_rollout(namespace, name, |status| {
            status.ready_replicas = Some(1);
            status.available_replicas = Some(1);
            upsert_condition(status, "Available", "True", "MinimumReplicasAvailable");
            upsert_condition(status, "Progressing", "True", "NewReplicaSetAvailable");
        })
    }

    /// Report a replica failure on the deployment.
    pub fn mark_replica_failure(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.set_rollout(namespace, name, |status| {
            upsert_condition(status, "ReplicaFailure", "True", "FailedCreate");
        })
    }

    /// Report that the deployment exceeded its progress deadline.
    pub fn mark_progress_deadline_exceeded(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<()> {
        self.set_rollout(namespace, name, |status| {
            upsert_condition(status, "Progressing", "False", "ProgressDeadlineExceeded");
        })
    }

    /// Set a deletion timestamp on a desired resource without removing it.
    pub fn mark_deleting(&self, key: &DesiredKey) -> ClusterResult<()> {
        let mut state = self.state.lock();
        let desired = state.desired.get_mut(key).ok_or_else(|| not_found(key))?;
        desired.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
        Ok(())
    }

    /// Make calls for the given desired resource fail.
    pub fn fail_calls_for(&self, key: DesiredKey) {
        self.failing.lock().insert(key);
    }

    /// Stop failing calls for every desired resource.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Make every call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by the given duration.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Keep owned objects alive after their owner is deleted until
    /// [`collect_garbage`](Self::collect_garbage) runs.
    pub fn set_deferred_gc(&self, deferred: bool) {
        self.deferred_gc.store(deferred, Ordering::SeqCst);
    }

    /// Remove every Deployment and Service whose owner no longer exists.
    pub fn collect_garbage(&self) {
        let mut state = self.state.lock();
        let live: HashSet<String> = state
            .desired
            .values()
            .filter_map(|d| d.meta().uid.clone())
            .collect();
        let orphaned = |owners: &Option<Vec<OwnerReference>>| {
            owners
                .as_ref()
                .is_some_and(|refs| refs.iter().any(|r| !live.contains(&r.uid)))
        };
        state
            .deployments
            .retain(|_, d| !orphaned(&d.metadata.owner_references));
        state
            .services
            .retain(|_, s| !orphaned(&s.metadata.owner_references));
    }

    /// Number of desired resources.
    pub fn desired_count(&self) -> usize {
        self.state.lock().desired.len()
    }

    /// Keys of every desired resource.
    pub fn desired_keys(&self) -> Vec<DesiredKey> {
        self.state.lock().desired.keys().cloned().collect()
    }

    /// Number of deployments.
    pub fn deployment_count(&self) -> usize {
        self.state.lock().deployments.len()
    }

    /// Number of services.
    pub fn service_count(&self) -> usize {
        self.state.lock().services.len()
    }

    /// Total create, replace and delete calls on Deployments and Services.
    pub fn workload_writes(&self) -> usize {
        self.workload_writes.load(Ordering::SeqCst)
    }

    /// Total status patches on desired resources.
    pub fn status_patches(&self) -> usize {
        self.status_patches.load(Ordering::SeqCst)
    }

    fn set_rollout(
        &self,
        namespace: &str,
        name: &str,
        update: impl FnOnce(&mut DeploymentStatus),
    ) -> ClusterResult<()> {
        let mut state = self.state.lock();
        let version = state.bump();
        let deployment = state
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::NotFound {
                kind: "Deployment".to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;
        update(deployment.status.get_or_insert_with(Default::default));
        deployment.metadata.resource_version = Some(version);
        Ok(())
    }

    fn check_namespace(&self, state: &State, kind: &str, key: &ObjectKey) -> ClusterResult<()> {
        let required = self.namespaces_required.load(Ordering::SeqCst);
        if required && !state.namespaces.contains_key(&key.0) {
            return Err(ClusterError::NotFound {
                kind: kind.to_string(),
                name: key.1.clone(),
                namespace: key.0.clone(),
            });
        }
        Ok(())
    }

    async fn enter(&self, key: Option<&DesiredKey>) -> ClusterResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClusterError::Unavailable("memory cluster offline".to_string()));
        }
        if let Some(key) = key {
            if self.failing.lock().contains(key) {
                return Err(ClusterError::Unavailable(format!("injected failure for {}", key)));
            }
        }
        Ok(())
    }

    fn cascade(&self, state: &mut State, key: &DesiredKey, uid: Option<&str>) {
        if self.deferred_gc.load(Ordering::SeqCst) {
            return;
        }
        let owned = |owners: &Option<Vec<OwnerReference>>| owned_by(owners, key, uid);
        state
            .deployments
            .retain(|_, d| !owned(&d.metadata.owner_references));
        state
            .services
            .retain(|_, s| !owned(&s.metadata.owner_references));
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterApi for MemoryCluster {
    fn submit_desired(&self, mut desired: DesiredObject) -> ClusterFuture<'_, ()> {
        Box::pin(async move {
            let key = desired.key();
            self.enter(Some(&key)).await?;
            let mut state = self.state.lock();
            state.ensure_namespace(&key.namespace);
            if state.desired.contains_key(&key) {
                return Ok(());
            }
            let version = state.bump();
            let meta = desired.meta_mut();
            meta.uid = Some(format!("uid-{}", version));
            meta.resource_version = Some(version);
            meta.creation_timestamp = Some(Time(Utc::now()));
            meta.generation = Some(1);
            state.desired.insert(key, desired);
            Ok(())
        })
    }

    fn get_desired<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, Option<DesiredObject>> {
        Box::pin(async move {
            self.enter(Some(key)).await?;
            Ok(self.state.lock().desired.get(key).cloned())
        })
    }

    fn delete_desired<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.enter(Some(key)).await?;
            let mut state = self.state.lock();
            if let Some(removed) = state.desired.remove(key) {
                let uid = removed.meta().uid.clone();
                self.cascade(&mut state, key, uid.as_deref());
            }
            Ok(())
        })
    }

    fn patch_desired_status<'a>(
        &'a self,
        key: &'a DesiredKey,
        status: WorkloadStatus,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.enter(Some(key)).await?;
            let mut state = self.state.lock();
            let version = state.bump();
            let desired = state.desired.get_mut(key).ok_or_else(|| not_found(key))?;
            desired.set_status(status);
            desired.meta_mut().resource_version = Some(version);
            self.status_patches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn get_secret<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Secret>> {
        Box::pin(async move {
            self.enter(None).await?;
            Ok(self
                .state
                .lock()
                .secrets
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        })
    }

    fn get_deployment<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Deployment>> {
        Box::pin(async move {
            self.enter(None).await?;
            Ok(self
                .state
                .lock()
                .deployments
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        })
    }

    fn create_deployment(&self, mut deployment: Deployment) -> ClusterFuture<'_, Deployment> {
        Box::pin(async move {
            self.enter(None).await?;
            let key = object_key("Deployment", &deployment.metadata)?;
            let mut state = self.state.lock();
            self.check_namespace(&state, "Deployment", &key)?;
            if state.deployments.contains_key(&key) {
                return Err(ClusterError::Conflict {
                    kind: "Deployment".to_string(),
                    name: key.1,
                });
            }
            let version = state.bump();
            deployment.metadata.uid = Some(format!("uid-{}", version));
            deployment.metadata.resource_version = Some(version);
            deployment.metadata.generation = Some(1);
            deployment.status = None;
            state.deployments.insert(key, deployment.clone());
            self.workload_writes.fetch_add(1, Ordering::SeqCst);
            Ok(deployment)
        })
    }

    fn replace_deployment(&self, mut deployment: Deployment) -> ClusterFuture<'_, Deployment> {
        Box::pin(async move {
            self.enter(None).await?;
            let key = object_key("Deployment", &deployment.metadata)?;
            let mut state = self.state.lock();
            let version = state.bump();
            let live = state.deployments.get_mut(&key).ok_or_else(|| ClusterError::NotFound {
                kind: "Deployment".to_string(),
                name: key.1.clone(),
                namespace: key.0.clone(),
            })?;
            if deployment.metadata.resource_version != live.metadata.resource_version {
                return Err(ClusterError::Conflict {
                    kind: "Deployment".to_string(),
                    name: key.1,
                });
            }
            let generation = live.metadata.generation.unwrap_or(1);
            if deployment.spec != live.spec {
                // A new template starts a fresh rollout.
                deployment.status = None;
                deployment.metadata.generation = Some(generation + 1);
            } else {
                deployment.status = live.status.clone();
                deployment.metadata.generation = Some(generation);
            }
            deployment.metadata.uid = live.metadata.uid.clone();
            deployment.metadata.resource_version = Some(version);
            *live = deployment.clone();
            self.workload_writes.fetch_add(1, Ordering::SeqCst);
            Ok(deployment)
        })
    }

    fn delete_deployment<'a>(&'a self, namespace: &'a str, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.enter(None).await?;
            let removed = self
                .state
                .lock()
                .deployments
                .remove(&(namespace.to_string(), name.to_string()));
            if removed.is_some() {
                self.workload_writes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    fn get_service<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Service>> {
        Box::pin(async move {
            self.enter(None).await?;
            Ok(self
                .state
                .lock()
                .services
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        })
    }

    fn create_service(&self, mut service: Service) -> ClusterFuture<'_, Service> {
        Box::pin(async move {
            self.enter(None).await?;
            let key = object_key("Service", &service.metadata)?;
            let mut state = self.state.lock();
            self.check_namespace(&state, "Service", &key)?;
            if state.services.contains_key(&key) {
                return Err(ClusterError::Conflict {
                    kind: "Service".to_string(),
                    name: key.1,
                });
            }
            let version = state.bump();
            service.metadata.uid = Some(format!("uid-{}", version));
            service.metadata.resource_version = Some(version);
            if let Some(spec) = service.spec.as_mut() {
                spec.cluster_ip = Some(format!("10.96.0.{}", state.next_version % 250 + 1));
            }
            state.services.insert(key, service.clone());
            self.workload_writes.fetch_add(1, Ordering::SeqCst);
            Ok(service)
        })
    }

    fn replace_service(&self, mut service: Service) -> ClusterFuture<'_, Service> {
        Box::pin(async move {
            self.enter(None).await?;
            let key = object_key("Service", &service.metadata)?;
            let mut state = self.state.lock();
            let version = state.bump();
            let live = state.services.get_mut(&key).ok_or_else(|| ClusterError::NotFound {
                kind: "Service".to_string(),
                name: key.1.clone(),
                namespace: key.0.clone(),
            })?;
            if service.metadata.resource_version != live.metadata.resource_version {
                return Err(ClusterError::Conflict {
                    kind: "Service".to_string(),
                    name: key.1,
                });
            }
            service.metadata.uid = live.metadata.uid.clone();
            service.metadata.resource_version = Some(version);
            *live = service.clone();
            self.workload_writes.fetch_add(1, Ordering::SeqCst);
            Ok(service)
        })
    }

    fn delete_service<'a>(&'a self, namespace: &'a str, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.enter(None).await?;
            let removed = self
                .state
                .lock()
                .services
                .remove(&(namespace.to_string(), name.to_string()));
            if removed.is_some() {
                self.workload_writes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    fn owned_objects_remaining<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, bool> {
        Box::pin(async move {
            self.enter(Some(key)).await?;
            let state = self.state.lock();
            let owned = |meta: &ObjectMeta| {
                meta.namespace.as_deref() == Some(key.namespace.as_str())
                    && owned_by(&meta.owner_references, key, None)
            };
            Ok(state.deployments.values().any(|d| owned(&d.metadata))
                || state.services.values().any(|s| owned(&s.metadata)))
        })
    }
}

fn owned_by(owners: &Option<Vec<OwnerReference>>, key: &DesiredKey, uid: Option<&str>) -> bool {
    owners.as_ref().is_some_and(|refs| {
        refs.iter().any(|r| {
            r.kind == key.kind.as_str()
                && r.name == key.name
                && uid.is_none_or(|uid| r.uid == uid)
        })
    })
}

fn object_key(kind: &str, meta: &ObjectMeta) -> ClusterResult<ObjectKey> {
    match (&meta.namespace, &meta.name) {
        (Some(namespace), Some(name)) => Ok((namespace.clone(), name.clone())),
        _ => Err(ClusterError::Invariant(format!(
            "{} submitted without namespace and name",
            kind
        ))),
    }
}

fn not_found(key: &DesiredKey) -> ClusterError {
    ClusterError::NotFound {
        kind: key.kind.to_string(),
        name: key.name.clone(),
        namespace: key.namespace.clone(),
    }
}

fn upsert_condition(status: &mut DeploymentStatus, type_: &str, value: &str, reason: &str) {
    let conditions = status.conditions.get_or_insert_with(Vec::new);
    let condition = DeploymentCondition {
        type_: type_.to_string(),
        status: value.to_string(),
        reason: Some(reason.to_string()),
        last_transition_time: Some(Time(Utc::now())),
        ..Default::default()
    };
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}
