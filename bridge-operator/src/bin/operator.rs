//! Event Bridge Kubernetes Operator binary.
//!
//! Runs the BridgeIngress and BridgeExecutor controllers.

use bridge_core::observability::{TracingConfig, init_tracing};
use bridge_core::{BridgeExecutor, BridgeIngress, KubeCluster, SystemClock};
use bridge_operator::OperatorConfig;
use bridge_operator::controller::{ControllerContext, Reconciler, runner};
use kube::{Client, CustomResourceExt};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Check for CRD generation mode
    if std::env::args().any(|arg| arg == "--generate-crds") {
        generate_crds()?;
        return Ok(());
    }

    init_tracing(&TracingConfig::from_env("bridge-operator"))?;
    tracing::info!("Starting Event Bridge operator");

    let config = OperatorConfig::from_env();
    tracing::info!(
        deadline_secs = config.provisioning_deadline.as_secs(),
        resync_secs = config.resync_interval.as_secs(),
        namespace = ?config.watch_namespace,
        "Loaded operator configuration"
    );

    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let cluster = KubeCluster::new(client.clone()).with_field_manager(config.field_manager.clone());
    let ctx = Arc::new(ControllerContext::new(
        Arc::new(cluster),
        Arc::new(SystemClock::new()),
        config,
    ));
    let reconciler = Reconciler::new(ctx);

    let ingress_controller = runner::run_ingress_controller(client.clone(), reconciler.clone());
    let executor_controller = runner::run_executor_controller(client, reconciler);

    tokio::select! {
        result = ingress_controller => {
            tracing::info!("BridgeIngress controller exited: {:?}", result);
            result?;
        }
        result = executor_controller => {
            tracing::info!("BridgeExecutor controller exited: {:?}", result);
            result?;
        }
    }

    Ok(())
}

/// Generate CRD YAML files.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&BridgeIngress::crd())?);
    println!("---");
    println!("{}", serde_yaml::to_string(&BridgeExecutor::crd())?);
    Ok(())
}
