//! Cluster backend talking to a live Kubernetes API server.

use super::{ClusterApi, ClusterFuture, tenant_namespace};
use crate::crd::{
    BridgeExecutor, BridgeIngress, DesiredKey, DesiredObject, WorkloadKind, WorkloadStatus,
};
use crate::error::{ClusterError, ClusterResult};
use crate::naming::INSTANCE_LABEL;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::{debug, info};

/// Field manager recorded on writes unless overridden.
pub const DEFAULT_FIELD_MANAGER: &str = "bridge-operator";

/// Cluster backed by a `kube` client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    field_manager: String,
}

impl KubeCluster {
    /// Create a backend from a client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }

    /// Record writes under the given field manager.
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    /// Create a backend from the ambient kubeconfig or in-cluster config.
    pub async fn try_default() -> ClusterResult<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> ClusterResult<Option<K>>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, object: K) -> ClusterResult<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = namespace_of(&object)?;
        let name = object.name_any();
        self.api::<K>(&namespace)
            .create(&self.post_params(), &object)
            .await
            .map_err(|e| write_error(K::kind(&()).as_ref(), &namespace, &name, e))
    }

    async fn replace<K>(&self, object: K) -> ClusterResult<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = namespace_of(&object)?;
        let name = object.name_any();
        self.api::<K>(&namespace)
            .replace(&name, &self.post_params(), &object)
            .await
            .map_err(|e| write_error(K::kind(&()).as_ref(), &namespace, &name, e))
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> ClusterResult<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the namespace unless it exists. Losing a create race is fine.
    async fn ensure_namespace(&self, name: &str) -> ClusterResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(name).await?.is_some() {
            return Ok(());
        }
        match api.create(&self.post_params(), &tenant_namespace(name)).await {
            Ok(_) => {
                info!(namespace = %name, "Tenant namespace created");
                Ok(())
            }
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn any_owned<K>(&self, key: &DesiredKey) -> ClusterResult<bool>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let params = ListParams::default().labels(&format!("{}={}", INSTANCE_LABEL, key.name));
        let objects = self.api::<K>(&key.namespace).list(&params).await?;
        Ok(objects.items.iter().any(|o| {
            o.owner_references()
                .iter()
                .any(|r| r.kind == key.kind.as_str() && r.name == key.name)
        }))
    }
}

impl ClusterApi for KubeCluster {
    fn submit_desired(&self, desired: DesiredObject) -> ClusterFuture<'_, ()> {
        Box::pin(async move {
            let key = desired.key();
            self.ensure_namespace(&key.namespace).await?;
            let result = match desired {
                DesiredObject::Ingress(ingress) => self.create(ingress).await.map(|_| ()),
                DesiredObject::Executor(executor) => self.create(executor).await.map(|_| ()),
            };
            match result {
                Err(ClusterError::Conflict { .. }) => {
                    debug!(key = %key, "Desired resource already exists");
                    Ok(())
                }
                other => other,
            }
        })
    }

    fn get_desired<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, Option<DesiredObject>> {
        Box::pin(async move {
            Ok(match key.kind {
                WorkloadKind::Ingress => self
                    .get_opt::<BridgeIngress>(&key.namespace, &key.name)
                    .await?
                    .map(DesiredObject::Ingress),
                WorkloadKind::Executor => self
                    .get_opt::<BridgeExecutor>(&key.namespace, &key.name)
                    .await?
                    .map(DesiredObject::Executor),
            })
        })
    }

    fn delete_desired<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            match key.kind {
                WorkloadKind::Ingress => {
                    self.delete::<BridgeIngress>(&key.namespace, &key.name)
                        .await
                }
                WorkloadKind::Executor => {
                    self.delete::<BridgeExecutor>(&key.namespace, &key.name)
                        .await
                }
            }
        })
    }

    fn patch_desired_status<'a>(
        &'a self,
        key: &'a DesiredKey,
        status: WorkloadStatus,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let patch = json!({ "status": status });
            let params = PatchParams {
                field_manager: Some(self.field_manager.clone()),
                ..Default::default()
            };
            match key.kind {
                WorkloadKind::Ingress => {
                    self.api::<BridgeIngress>(&key.namespace)
                        .patch_status(&key.name, &params, &Patch::Merge(&patch))
                        .await?;
                }
                WorkloadKind::Executor => {
                    self.api::<BridgeExecutor>(&key.namespace)
                        .patch_status(&key.name, &params, &Patch::Merge(&patch))
                        .await?;
                }
            }
            Ok(())
        })
    }

    fn get_secret<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Secret>> {
        Box::pin(self.get_opt::<Secret>(namespace, name))
    }

    fn get_deployment<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Deployment>> {
        Box::pin(self.get_opt::<Deployment>(namespace, name))
    }

    fn create_deployment(&self, deployment: Deployment) -> ClusterFuture<'_, Deployment> {
        Box::pin(self.create(deployment))
    }

    fn replace_deployment(&self, deployment: Deployment) -> ClusterFuture<'_, Deployment> {
        Box::pin(self.replace(deployment))
    }

    fn delete_deployment<'a>(&'a self, namespace: &'a str, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(self.delete::<Deployment>(namespace, name))
    }

    fn get_service<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<Service>> {
        Box::pin(self.get_opt::<Service>(namespace, name))
    }

    fn create_service(&self, service: Service) -> ClusterFuture<'_, Service> {
        Box::pin(self.create(service))
    }

    fn replace_service(&self, service: Service) -> ClusterFuture<'_, Service> {
        Box::pin(self.replace(service))
    }

    fn delete_service<'a>(&'a self, namespace: &'a str, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(self.delete::<Service>(namespace, name))
    }

    fn owned_objects_remaining<'a>(&'a self, key: &'a DesiredKey) -> ClusterFuture<'a, bool> {
        Box::pin(async move {
            Ok(self.any_owned::<Deployment>(key).await? || self.any_owned::<Service>(key).await?)
        })
    }
}

fn namespace_of<K: Resource>(object: &K) -> ClusterResult<String> {
    object.meta().namespace.clone().ok_or_else(|| {
        ClusterError::Invariant(format!(
            "{} submitted without a namespace",
            object.meta().name.as_deref().unwrap_or("<unnamed>")
        ))
    })
}

/// Map a write failure: 409 is an optimistic concurrency conflict, 404 a
/// missing namespace or replace target.
fn write_error(kind: &str, namespace: &str, name: &str, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => ClusterError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        },
        other => ClusterError::Kube(other),
    }
}
