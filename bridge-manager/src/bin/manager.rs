//! Event Bridge manager binary.
//!
//! Runs the provisioning sweep that moves tenant records through their
//! lifecycle. The tenant-facing surface embeds the same [`Lifecycle`].

use bridge_core::naming::customer_namespace;
use bridge_core::observability::{TracingConfig, init_tracing};
use bridge_core::{ClusterApi, DesiredKey, KubeCluster, SystemClock, WorkloadKind, poll_until};
use bridge_manager::{Lifecycle, ManagerConfig, MemoryRecordStore, Sweeper};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&TracingConfig::from_env("bridge-manager"))?;
    tracing::info!("Starting Event Bridge manager");

    let config = ManagerConfig::from_env();
    tracing::info!(
        sweep_secs = config.sweep_interval.as_secs(),
        call_timeout_secs = config.call_timeout.as_secs(),
        ingress_image = %config.ingress_image,
        executor_image = %config.executor_image,
        "Loaded manager configuration"
    );

    let cluster = Arc::new(KubeCluster::try_default().await?.with_field_manager("bridge-manager"));
    wait_for_cluster(cluster.as_ref(), config.call_timeout).await?;
    tracing::info!("Connected to Kubernetes cluster");

    let lifecycle = Arc::new(Lifecycle::new(
        Arc::new(MemoryRecordStore::new()),
        cluster,
        Arc::new(SystemClock::new()),
        config,
    ));
    let sweeper = Sweeper::new(lifecycle);

    tokio::select! {
        _ = sweeper.run() => {
            tracing::info!("Sweeper exited");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown signal received");
            sweeper.stop();
        }
    }

    Ok(())
}

/// Wait until the API server answers a desired-resource lookup.
async fn wait_for_cluster(cluster: &dyn ClusterApi, call_timeout: Duration) -> anyhow::Result<()> {
    let probe = DesiredKey::new(
        WorkloadKind::Ingress,
        customer_namespace("probe"),
        "ob-probe",
    );

    let probe = &probe;
    poll_until(Duration::from_secs(2), Duration::from_secs(60), move || async move {
        match tokio::time::timeout(call_timeout, cluster.get_desired(probe)).await {
            Ok(Ok(_)) => Some(()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Cluster not reachable yet");
                None
            }
            Err(_) => {
                tracing::warn!("Cluster probe timed out");
                None
            }
        }
    })
    .await?;
    Ok(())
}
