//! `kube-runtime` controllers driving the [`Reconciler`].
//!
//! Each desired resource kind gets its own controller. Both watch the
//! Deployments and Services they own, so rollout progress triggers a pass,
//! and requeue every resource at the configured resync interval.

use super::{ReconcileAction, Reconciler};
use crate::error::OperatorError;
use bridge_core::naming::{MANAGED_BY, MANAGED_BY_LABEL};
use bridge_core::{BridgeExecutor, BridgeIngress, DesiredObject};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run the BridgeIngress controller until shutdown is signalled.
pub async fn run_ingress_controller(client: Client, reconciler: Reconciler) -> anyhow::Result<()> {
    info!("Starting BridgeIngress controller");
    run_controller::<BridgeIngress>(client, reconciler).await
}

/// Run the BridgeExecutor controller until shutdown is signalled.
pub async fn run_executor_controller(client: Client, reconciler: Reconciler) -> anyhow::Result<()> {
    info!("Starting BridgeExecutor controller");
    run_controller::<BridgeExecutor>(client, reconciler).await
}

async fn run_controller<K>(client: Client, reconciler: Reconciler) -> anyhow::Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    DesiredObject: From<K>,
{
    let namespace = reconciler.context().config.watch_namespace.clone();
    let desired: Api<K> = scoped_api(&client, namespace.as_deref());
    let deployments: Api<Deployment> = scoped_api(&client, namespace.as_deref());
    let services: Api<Service> = scoped_api(&client, namespace.as_deref());
    let owned = WatcherConfig::default().labels(&format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY));

    Controller::new(desired, WatcherConfig::default())
        .owns(deployments, owned.clone())
        .owns(services, owned)
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, Arc::new(reconciler))
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(name = %obj.name, ?action, "Reconciled");
                }
                Err(e) => {
                    warn!(error = %e, "Controller stream error");
                }
            }
        })
        .await;

    Ok(())
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn reconcile<K>(object: Arc<K>, reconciler: Arc<Reconciler>) -> Result<Action, OperatorError>
where
    K: Clone,
    DesiredObject: From<K>,
{
    let desired = DesiredObject::from(object.as_ref().clone());
    let outcome = reconciler.reconcile(&desired).await?;
    debug!(key = %desired.key(), control = ?outcome.control, "Reconcile pass finished");
    Ok(Action::requeue(reconciler.context().config.resync_interval))
}

fn error_policy<K>(object: Arc<K>, err: &OperatorError, _reconciler: Arc<Reconciler>) -> Action
where
    K: Resource,
{
    let name = object.name_any();
    let action = match err {
        OperatorError::InvalidResource { .. } => ReconcileAction::requeue_medium(),
        e if e.is_transient() => ReconcileAction::requeue_short(),
        _ => ReconcileAction::Done,
    };

    match action {
        ReconcileAction::Requeue(after) => {
            warn!(name = %name, error = %err, ?after, "Reconciliation failed, retrying");
            Action::requeue(after)
        }
        ReconcileAction::Done => {
            error!(name = %name, error = %err, "Reconciliation failed permanently");
            Action::await_change()
        }
    }
}
