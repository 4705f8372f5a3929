//! Provisioning sweep.
//!
//! The sweep is the only place tenant records move between phases after
//! creation. Each cycle visits every record that is not terminal and reads the
//! status of its desired resource:
//!
//! | Observed                                 | New phase      |
//! |------------------------------------------|----------------|
//! | overall ready                            | `Ready`        |
//! | `Ready=False` / `DeploymentFailed`       | `Failed`       |
//! | anything else                            | `Provisioning` |
//! | deletion requested, workload gone        | `Deleted`      |
//!
//! A live record whose desired resource is missing gets it submitted again;
//! the record keeps its phase until the new resource reports status.
//!
//! Deleted records are removed from the store in the same cycle. Every
//! cluster call is bounded by the configured timeout. A record whose
//! calls fail or time out is skipped for the cycle without affecting others.

use crate::error::LifecycleResult;
use crate::lifecycle::Lifecycle;
use crate::model::{Phase, TenantRecord};
use bridge_core::{ConditionReason, ConditionStatus, ConditionType, WorkloadStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, warn};

/// What one sweep cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records visited.
    pub examined: usize,
    /// Records whose phase, endpoint or publish time changed.
    pub advanced: usize,
    /// Desired resources submitted again.
    pub resubmitted: usize,
    /// Records removed after deletion was confirmed.
    pub removed: usize,
    /// Records skipped because of an error or timeout.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepOutcome {
    Unchanged,
    Advanced(Phase),
    Resubmitted,
    Removed,
}

/// Phase a live record should be in given its workload status.
pub fn target_phase(status: &WorkloadStatus) -> Phase {
    if status.is_ready() {
        return Phase::Ready;
    }
    let failed = status.condition(ConditionType::Ready).is_some_and(|c| {
        c.status == ConditionStatus::False && c.reason == Some(ConditionReason::DeploymentFailed)
    });
    if failed {
        Phase::Failed
    } else {
        Phase::Provisioning
    }
}

impl Lifecycle {
    /// Run one sweep cycle over every non-terminal record.
    pub async fn sweep(&self) -> SweepReport {
        let records = self.store.list_by_phase(&Phase::ACTIVE);
        let mut report = SweepReport::default();

        for record in records {
            report.examined += 1;
            let id = record.id.clone();
            let span = bridge_core::lifecycle_span!("sweep", id);

            match self.sweep_record(record).instrument(span).await {
                Ok(SweepOutcome::Unchanged) => {}
                Ok(SweepOutcome::Advanced(phase)) => {
                    debug!(id = %id, phase = %phase, "Record advanced");
                    report.advanced += 1;
                }
                Ok(SweepOutcome::Resubmitted) => report.resubmitted += 1,
                Ok(SweepOutcome::Removed) => report.removed += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "Sweep of record failed, retrying next cycle");
                    report.failed += 1;
                }
            }
        }

        if report != SweepReport::default() {
            debug!(?report, "Sweep finished");
        }
        report
    }

    async fn sweep_record(&self, record: TenantRecord) -> LifecycleResult<SweepOutcome> {
        if record.phase == Phase::DeletionRequested {
            return self.confirm_deletion(&record).await;
        }

        let key = record.desired_key();
        let Some(desired) = self.bounded(self.cluster.get_desired(&key)).await? else {
            let object = self.desired_object(&record)?;
            self.bounded(self.cluster.submit_desired(object)).await?;
            if record.phase == Phase::Ready {
                warn!(key = %key, "Desired resource of a ready record vanished, re-submitted");
            } else {
                info!(key = %key, "Desired resource missing, re-submitted");
            }
            return Ok(SweepOutcome::Resubmitted);
        };

        let status = desired.status().cloned().unwrap_or_default();
        let target = target_phase(&status);
        let now = self.clock.now();

        let updated = self.update_record(&record.id, |r| {
            if !matches!(r.phase, Phase::Accepted | Phase::Provisioning | Phase::Ready) {
                return false;
            }
            let mut changed = false;
            if r.phase != target {
                r.phase = target;
                changed = true;
            }
            if target == Phase::Ready {
                if r.endpoint.is_none() && status.endpoint.is_some() {
                    r.endpoint = status.endpoint.clone();
                    changed = true;
                }
                if r.published_at.is_none() {
                    r.published_at = Some(now);
                    changed = true;
                }
            }
            changed
        })?;

        Ok(match updated {
            Some(updated) => {
                if updated.phase != record.phase {
                    info!(
                        id = %updated.id,
                        kind = %updated.kind,
                        from = %record.phase,
                        to = %updated.phase,
                        "Phase changed"
                    );
                }
                SweepOutcome::Advanced(updated.phase)
            }
            None => SweepOutcome::Unchanged,
        })
    }

    async fn confirm_deletion(&self, record: &TenantRecord) -> LifecycleResult<SweepOutcome> {
        let key = record.desired_key();

        if let Some(desired) = self.bounded(self.cluster.get_desired(&key)).await? {
            if !desired.is_deleting() {
                self.bounded(self.cluster.delete_desired(&key)).await?;
                debug!(key = %key, "Deletion of desired resource re-issued");
            }
            return Ok(SweepOutcome::Unchanged);
        }

        if self.bounded(self.cluster.owned_objects_remaining(&key)).await? {
            debug!(key = %key, "Waiting for owned objects to be collected");
            return Ok(SweepOutcome::Unchanged);
        }

        let deleted = self.update_record(&record.id, |r| {
            if r.phase != Phase::DeletionRequested {
                return false;
            }
            r.phase = Phase::Deleted;
            true
        })?;
        if deleted.is_none() {
            return Ok(SweepOutcome::Unchanged);
        }

        self.store.remove(&record.id)?;
        info!(id = %record.id, kind = %record.kind, "Record deleted");
        Ok(SweepOutcome::Removed)
    }
}

/// Shortest interval the sweeper ticks at; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Runs [`Lifecycle::sweep`] on a fixed interval.
pub struct Sweeper {
    lifecycle: Arc<Lifecycle>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl Sweeper {
    /// Create a sweeper using the configured sweep interval.
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        let interval = lifecycle.config().sweep_interval;
        Self {
            lifecycle,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the sweep interval. Zero is raised to one millisecond.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Interval the sweeper ticks at.
    pub fn interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }

    /// Check if the sweeper is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sweep until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        let interval = self.interval();
        info!(interval_ms = interval.as_millis() as u64, "Sweeper started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.lifecycle.sweep().await;
        }

        info!("Sweeper stopped");
    }

    /// Stop after the current cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
