//! Readiness derivation from Deployment rollout status.

use bridge_core::condition::parse_time;
use bridge_core::{Condition, ConditionReason, ConditionStatus, ConditionType};
use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition};
use std::time::Duration;

/// What the orchestrator reports about a Deployment rollout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutObservation {
    /// `ReplicaFailure=True` is present.
    pub replica_failure: Option<String>,
    /// `Available=True` is present.
    pub available: bool,
    /// Status of the `Progressing` condition, if reported.
    pub progressing: Option<bool>,
    /// `Progressing=False` with reason `ProgressDeadlineExceeded`.
    pub deadline_exceeded: bool,
}

impl RolloutObservation {
    /// Read the rollout conditions of a Deployment.
    ///
    /// An absent Deployment observes as not available.
    pub fn of(deployment: Option<&Deployment>) -> Self {
        let conditions: &[DeploymentCondition] = deployment
            .and_then(|d| d.status.as_ref())
            .and_then(|s| s.conditions.as_deref())
            .unwrap_or_default();
        let find = |type_: &str| conditions.iter().find(|c| c.type_ == type_);

        let replica_failure = find("ReplicaFailure")
            .filter(|c| c.status == "True")
            .map(|c| {
                c.message
                    .clone()
                    .or_else(|| c.reason.clone())
                    .unwrap_or_else(|| "ReplicaFailure".to_string())
            });
        let progressing_condition = find("Progressing");

        Self {
            replica_failure,
            available: find("Available").is_some_and(|c| c.status == "True"),
            progressing: progressing_condition.map(|c| c.status == "True"),
            deadline_exceeded: progressing_condition.is_some_and(|c| {
                c.status == "False" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
            }),
        }
    }
}

/// Derive the `Ready` condition.
///
/// Precedence, first match wins:
///
/// 1. a previous `DeploymentFailed` stays failed unless the workload was
///    just recreated
/// 2. replica failure fails the workload
/// 3. available and not stalled is ready
/// 4. an orchestrator-reported progress deadline fails the workload
/// 5. otherwise the workload is not available; once it has been in that
///    state for longer than `deadline` it fails
///
/// The deadline runs from the transition time of a previous
/// `DeploymentNotAvailable` condition, or from `now` if there is none.
pub fn derive_ready(
    previous: Option<&Condition>,
    observation: &RolloutObservation,
    recreated: bool,
    now: DateTime<Utc>,
    deadline: Duration,
) -> Condition {
    let previous_reason = previous.and_then(|c| c.reason);

    if previous_reason == Some(ConditionReason::DeploymentFailed) && !recreated {
        let message = previous
            .and_then(|c| c.message.clone())
            .unwrap_or_else(|| "Deployment failed".to_string());
        return failed(message);
    }

    if let Some(message) = &observation.replica_failure {
        return failed(message.clone());
    }

    if observation.available && observation.progressing != Some(false) {
        return Condition::new(ConditionType::Ready, ConditionStatus::True)
            .with_reason(ConditionReason::DeploymentAvailable);
    }

    if observation.deadline_exceeded {
        return failed("ProgressDeadlineExceeded");
    }

    let since = previous
        .filter(|c| !recreated && c.reason == Some(ConditionReason::DeploymentNotAvailable))
        .and_then(|c| parse_time(&c.last_transition_time))
        .unwrap_or(now);
    let limit = TimeDelta::from_std(deadline).unwrap_or_else(|_| TimeDelta::weeks(5200));

    if now - since > limit {
        return failed(format!(
            "Deployment not available within {}s",
            deadline.as_secs()
        ));
    }

    Condition::new(ConditionType::Ready, ConditionStatus::False)
        .with_reason(ConditionReason::DeploymentNotAvailable)
}

fn failed(message: impl Into<String>) -> Condition {
    Condition::new(ConditionType::Ready, ConditionStatus::False)
        .with_reason(ConditionReason::DeploymentFailed)
        .with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::condition::format_time;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn deployment(conditions: &[(&str, &str, &str)]) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(t, s, r)| DeploymentCondition {
                            type_: t.to_string(),
                            status: s.to_string(),
                            reason: Some(r.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn not_available_since(time: DateTime<Utc>) -> Condition {
        let mut c = Condition::new(ConditionType::Ready, ConditionStatus::False)
            .with_reason(ConditionReason::DeploymentNotAvailable);
        c.last_transition_time = format_time(time);
        c
    }

    const DEADLINE: Duration = Duration::from_secs(300);

    #[test]
    fn missing_deployment_is_not_available() {
        let obs = RolloutObservation::of(None);
        let ready = derive_ready(None, &obs, false, t0(), DEADLINE);
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentNotAvailable));
        assert_eq!(ready.status, ConditionStatus::False);
    }

    #[test]
    fn available_and_progressing_is_ready() {
        let d = deployment(&[
            ("Available", "True", "MinimumReplicasAvailable"),
            ("Progressing", "True", "NewReplicaSetAvailable"),
        ]);
        let ready = derive_ready(None, &RolloutObservation::of(Some(&d)), false, t0(), DEADLINE);
        assert!(ready.is_true());
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentAvailable));
    }

    #[test]
    fn replica_failure_wins_over_availability() {
        let d = deployment(&[
            ("Available", "True", "MinimumReplicasAvailable"),
            ("ReplicaFailure", "True", "FailedCreate"),
        ]);
        let ready = derive_ready(None, &RolloutObservation::of(Some(&d)), false, t0(), DEADLINE);
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentFailed));
        assert_eq!(ready.message.as_deref(), Some("FailedCreate"));
    }

    #[test]
    fn orchestrator_deadline_fails() {
        let d = deployment(&[("Progressing", "False", "ProgressDeadlineExceeded")]);
        let ready = derive_ready(None, &RolloutObservation::of(Some(&d)), false, t0(), DEADLINE);
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentFailed));
    }

    #[test]
    fn unavailable_within_deadline_keeps_waiting() {
        let previous = not_available_since(t0());
        let ready = derive_ready(
            Some(&previous),
            &RolloutObservation::default(),
            false,
            t0() + TimeDelta::seconds(299),
            DEADLINE,
        );
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentNotAvailable));
    }

    #[test]
    fn unavailable_past_deadline_fails() {
        let previous = not_available_since(t0());
        let ready = derive_ready(
            Some(&previous),
            &RolloutObservation::default(),
            false,
            t0() + TimeDelta::seconds(301),
            DEADLINE,
        );
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentFailed));
        assert_eq!(ready.status, ConditionStatus::False);
    }

    #[test]
    fn recreate_restarts_the_deadline() {
        let previous = not_available_since(t0());
        let ready = derive_ready(
            Some(&previous),
            &RolloutObservation::default(),
            true,
            t0() + TimeDelta::seconds(600),
            DEADLINE,
        );
        assert_eq!(ready.reason, Some(ConditionReason::DeploymentNotAvailable));
    }

    #[test]
    fn failure_is_sticky_until_recreated() {
        let previous = failed("FailedCreate");
        let d = deployment(&[("Available", "True", "MinimumReplicasAvailable")]);
        let obs = RolloutObservation::of(Some(&d));

        let kept = derive_ready(Some(&previous), &obs, false, t0(), DEADLINE);
        assert_eq!(kept.reason, Some(ConditionReason::DeploymentFailed));
        assert_eq!(kept.message.as_deref(), Some("FailedCreate"));

        let fresh = derive_ready(Some(&previous), &obs, true, t0(), DEADLINE);
        assert!(fresh.is_true());
    }
}
