//! Reconciliation of bridge desired resources.
//!
//! - [`Reconciler`]: one level-triggered pass over a `BridgeIngress` or
//!   `BridgeExecutor`
//! - [`rollout`]: readiness derivation from Deployment status
//! - [`runner`]: `kube-runtime` controllers driving the reconciler
//!
//! # Usage with kube-runtime
//!
//! ```ignore
//! use bridge_operator::controller::{ControllerContext, Reconciler, runner};
//!
//! let ctx = Arc::new(ControllerContext::new(cluster, clock, config));
//! runner::run_ingress_controller(client, Reconciler::new(ctx)).await?;
//! ```

mod reconciler;
pub mod rollout;
pub mod runner;

pub use reconciler::{ReconcileOutcome, Reconciler, UpdateControl};

use crate::config::OperatorConfig;
use bridge_core::{ClusterApi, Clock, DesiredKey};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared context for controllers.
pub struct ControllerContext {
    /// Cluster access.
    pub cluster: Arc<dyn ClusterApi>,
    /// Time source for condition transitions.
    pub clock: Arc<dyn Clock>,
    /// Operator configuration.
    pub config: OperatorConfig,
    locks: KeyedLocks,
}

impl ControllerContext {
    /// Create a new controller context.
    pub fn new(cluster: Arc<dyn ClusterApi>, clock: Arc<dyn Clock>, config: OperatorConfig) -> Self {
        Self {
            cluster,
            clock,
            config,
            locks: KeyedLocks::default(),
        }
    }

    /// Serialise work on one desired resource.
    pub async fn lock(&self, key: &DesiredKey) -> OwnedMutexGuard<()> {
        self.locks.lock(key).await
    }

    /// Forget the lock of a resource that is gone or being deleted.
    pub fn release(&self, key: &DesiredKey) {
        self.locks.release(key);
    }

    /// Number of keys with a tracked lock.
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

/// Per-key mutual exclusion.
///
/// Different keys never contend.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<DesiredKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &DesiredKey) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the lock of `key` unless it is held or waited on.
    ///
    /// Runs under the map's shard lock, so no new holder can appear between
    /// the check and the removal.
    pub fn release(&self, key: &DesiredKey) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl ReconcileAction {
    /// Requeue after 5 seconds (default for transient errors).
    pub fn requeue_short() -> Self {
        Self::Requeue(Duration::from_secs(5))
    }

    /// Requeue after 30 seconds (default for waiting on external resources).
    pub fn requeue_medium() -> Self {
        Self::Requeue(Duration::from_secs(30))
    }
}
