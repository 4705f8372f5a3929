//! Desired resource reconciler.
//!
//! Reconciles `BridgeIngress` and `BridgeExecutor` resources into their
//! dependent Deployment and Service and reports readiness on the resource's
//! status.

use super::ControllerContext;
use super::rollout::{RolloutObservation, derive_ready};
use crate::error::{OperatorError, OperatorResult};
use crate::resources::{self, DependentResources};
use bridge_core::condition::{check_unique, set_condition};
use bridge_core::{
    Condition, ConditionReason, ConditionStatus, ConditionType, DesiredKey, DesiredObject,
    WorkloadKind, WorkloadStatus,
};
use k8s_openapi::api::apps::v1::Deployment;
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateControl {
    /// Nothing was written.
    NoUpdate,
    /// The status was written.
    UpdateStatus,
    /// An existing workload was replaced; the status was written.
    Recreate,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Status derived by this pass.
    pub status: WorkloadStatus,
    /// What was written.
    pub control: UpdateControl,
}

/// Reconciler for bridge desired resources.
#[derive(Clone)]
pub struct Reconciler {
    ctx: Arc<ControllerContext>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Shared controller context.
    pub fn context(&self) -> &Arc<ControllerContext> {
        &self.ctx
    }

    /// Fetch the desired resource behind `key` and reconcile it.
    ///
    /// The resource is read after the key lock is taken, so a pass always
    /// starts from the status the previous pass wrote. Returns `None` if the
    /// resource no longer exists.
    pub async fn reconcile_key(&self, key: &DesiredKey) -> OperatorResult<Option<ReconcileOutcome>> {
        let guard = self.ctx.lock(key).await;
        let pass = self
            .reconcile_current(key)
            .instrument(bridge_core::reconcile_span!(key))
            .await;
        drop(guard);

        let retired = match &pass {
            Ok(None) => true,
            Ok(Some((_, deleting))) => *deleting,
            Err(_) => false,
        };
        if retired {
            self.ctx.release(key);
        }
        pass.map(|p| p.map(|(outcome, _)| outcome))
    }

    /// Reconcile a desired resource.
    ///
    /// `desired` only names the resource; its current state is read again
    /// under the key lock. If it is gone, its own status is returned
    /// unchanged.
    pub async fn reconcile(&self, desired: &DesiredObject) -> OperatorResult<ReconcileOutcome> {
        let outcome = self.reconcile_key(&desired.key()).await?;
        Ok(outcome.unwrap_or_else(|| ReconcileOutcome {
            status: desired.status().cloned().unwrap_or_default(),
            control: UpdateControl::NoUpdate,
        }))
    }

    async fn reconcile_current(
        &self,
        key: &DesiredKey,
    ) -> OperatorResult<Option<(ReconcileOutcome, bool)>> {
        match self.ctx.cluster.get_desired(key).await? {
            Some(desired) => {
                let outcome = self.reconcile_locked(&desired).await?;
                Ok(Some((outcome, desired.is_deleting())))
            }
            None => {
                debug!(key = %key, "Desired resource is gone, nothing to reconcile");
                Ok(None)
            }
        }
    }

    async fn reconcile_locked(&self, desired: &DesiredObject) -> OperatorResult<ReconcileOutcome> {
        let key = desired.key();
        let previous = desired.status().cloned().unwrap_or_default();

        if desired.is_deleting() {
            debug!(key = %key, "Desired resource is being deleted, skipping");
            return Ok(ReconcileOutcome {
                status: previous,
                control: UpdateControl::NoUpdate,
            });
        }

        if let Err(duplicate) = check_unique(&previous.conditions) {
            return Err(OperatorError::Invariant(format!(
                "{} carries more than one {} condition",
                key, duplicate
            )));
        }

        info!(key = %key, "Reconciling desired resource");

        let now = self.ctx.clock.now();
        let mut status = previous.clone();
        let secret_name = desired.secret_name();

        if self
            .ctx
            .cluster
            .get_secret(&key.namespace, &secret_name)
            .await?
            .is_none()
        {
            info!(key = %key, secret = %secret_name, "Credential secret missing, waiting");
            set_condition(
                &mut status.conditions,
                Condition::new(ConditionType::Augmentation, ConditionStatus::False)
                    .with_reason(ConditionReason::SecretNotFound)
                    .with_message(format!("Secret '{}' not found", secret_name)),
                now,
            );
            set_condition(
                &mut status.conditions,
                Condition::new(ConditionType::Ready, ConditionStatus::False)
                    .with_reason(ConditionReason::MissingDependency)
                    .with_message("Waiting for credential secret"),
                now,
            );
            return Ok(ReconcileOutcome {
                status,
                control: UpdateControl::NoUpdate,
            });
        }

        set_condition(
            &mut status.conditions,
            Condition::new(ConditionType::Augmentation, ConditionStatus::True),
            now,
        );

        let owner = desired
            .owner_reference()
            .ok_or_else(|| OperatorError::InvalidResource {
                kind: key.kind.to_string(),
                name: key.name.clone(),
                reason: "resource has no uid yet".to_string(),
            })?;
        let built = resources::build(desired, &owner);

        let recreated = self.apply_deployment(&key, &built).await?;
        self.apply_service(&key, &built).await?;

        if recreated {
            // A new workload starts its own rollout clock.
            status
                .conditions
                .retain(|c| c.condition_type != ConditionType::Ready);
        }

        let live = self
            .ctx
            .cluster
            .get_deployment(&key.namespace, &key.name)
            .await?;
        let ready = derive_ready(
            previous.condition(ConditionType::Ready),
            &RolloutObservation::of(live.as_ref()),
            recreated,
            now,
            self.ctx.config.provisioning_deadline,
        );
        let is_ready = ready.is_true();
        if ready.reason == Some(ConditionReason::DeploymentFailed)
            && previous
                .condition(ConditionType::Ready)
                .and_then(|c| c.reason)
                != Some(ConditionReason::DeploymentFailed)
        {
            warn!(key = %key, message = ?ready.message, "Workload failed");
        }
        set_condition(&mut status.conditions, ready, now);

        if is_ready && key.kind == WorkloadKind::Ingress && status.endpoint.is_none() {
            status.endpoint = Some(resources::service_endpoint(&key.namespace, &key.name));
        }

        let changed = status != previous;
        if changed {
            self.ctx
                .cluster
                .patch_desired_status(&key, status.clone())
                .await?;
            info!(key = %key, ready = status.is_ready(), "Status updated");
        }

        let control = if recreated {
            UpdateControl::Recreate
        } else if changed {
            UpdateControl::UpdateStatus
        } else {
            UpdateControl::NoUpdate
        };

        Ok(ReconcileOutcome { status, control })
    }

    /// Create or converge the Deployment.
    ///
    /// Returns `true` if an existing Deployment was replaced.
    async fn apply_deployment(
        &self,
        key: &DesiredKey,
        built: &DependentResources,
    ) -> OperatorResult<bool> {
        let cluster = &self.ctx.cluster;
        let live = cluster.get_deployment(&key.namespace, &key.name).await?;

        match live {
            None => {
                info!(key = %key, "Creating deployment");
                cluster.create_deployment(built.deployment.clone()).await?;
                Ok(false)
            }
            Some(live) if resources::selector_differs(&built.deployment, &live) => {
                info!(key = %key, "Deployment selector changed, recreating");
                cluster.delete_deployment(&key.namespace, &key.name).await?;
                cluster.create_deployment(built.deployment.clone()).await?;
                Ok(true)
            }
            Some(live) if !resources::deployment_matches(&built.deployment, &live) => {
                info!(key = %key, "Deployment drifted, replacing");
                cluster
                    .replace_deployment(with_version(built.deployment.clone(), &live))
                    .await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Create or converge the Service.
    async fn apply_service(&self, key: &DesiredKey, built: &DependentResources) -> OperatorResult<()> {
        let cluster = &self.ctx.cluster;
        match cluster.get_service(&key.namespace, &key.name).await? {
            None => {
                info!(key = %key, "Creating service");
                cluster.create_service(built.service.clone()).await?;
            }
            Some(live) if !resources::service_matches(&built.service, &live) => {
                info!(key = %key, "Service drifted, replacing");
                let mut service = built.service.clone();
                service.metadata.resource_version = live.metadata.resource_version.clone();
                if let (Some(spec), Some(live_spec)) = (service.spec.as_mut(), live.spec.as_ref()) {
                    spec.cluster_ip = live_spec.cluster_ip.clone();
                    spec.cluster_ips = live_spec.cluster_ips.clone();
                }
                cluster.replace_service(service).await?;
            }
            Some(_) => {}
        }
        Ok(())
    }
}

fn with_version(mut deployment: Deployment, live: &Deployment) -> Deployment {
    deployment.metadata.resource_version = live.metadata.resource_version.clone();
    deployment
}
