//! Readiness conditions for desired resources.
//!
//! A condition describes one axis of readiness. A resource carries at most
//! one condition per [`ConditionType`], and it is ready only when every
//! required type is `True`.
//!
//! Transition times are monotonic: [`set_condition`] only stamps a new time
//! when the status or the reason changes. Re-applying an identical condition,
//! or one that differs only in its message, leaves the time untouched, so
//! reconciling unchanged state produces no status churn.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis of readiness.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ConditionType {
    /// The resource's external dependencies (credentials) are in place.
    Augmentation,
    /// The workload is rolled out and serving.
    Ready,
}

impl ConditionType {
    /// Condition types that must all be `True` for a resource to be ready.
    pub const REQUIRED: [ConditionType; 2] = [ConditionType::Augmentation, ConditionType::Ready];
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::Augmentation => write!(f, "Augmentation"),
            ConditionType::Ready => write!(f, "Ready"),
        }
    }
}

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not yet observed.
    Unknown,
}

/// Machine-readable reason attached to a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionReason {
    /// The referenced credential secret does not exist.
    SecretNotFound,
    /// A dependency is missing, nothing was built.
    MissingDependency,
    /// The workload rollout is available.
    DeploymentAvailable,
    /// The workload is still rolling out.
    DeploymentNotAvailable,
    /// The workload failed, or did not become available in time.
    DeploymentFailed,
}

impl ConditionReason {
    /// Whether the reason denotes a non-recoverable failure class.
    pub fn is_failure(&self) -> bool {
        matches!(self, ConditionReason::DeploymentFailed)
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionReason::SecretNotFound => "SecretNotFound",
            ConditionReason::MissingDependency => "MissingDependency",
            ConditionReason::DeploymentAvailable => "DeploymentAvailable",
            ConditionReason::DeploymentNotAvailable => "DeploymentNotAvailable",
            ConditionReason::DeploymentFailed => "DeploymentFailed",
        };
        write!(f, "{}", s)
    }
}

/// A typed readiness signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// Status of the condition.
    pub status: ConditionStatus,

    /// Reason for the current status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConditionReason>,

    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the status or reason changed (RFC 3339).
    #[serde(default)]
    pub last_transition_time: String,
}

impl Condition {
    /// Create a condition with no reason or message.
    ///
    /// The transition time is filled in by [`set_condition`].
    pub fn new(condition_type: ConditionType, status: ConditionStatus) -> Self {
        Self {
            condition_type,
            status,
            reason: None,
            message: None,
            last_transition_time: String::new(),
        }
    }

    /// Attach a reason.
    pub fn with_reason(mut self, reason: ConditionReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether the status is `True`.
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    fn same_transition_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason
    }
}

/// Look up the condition of the given type.
pub fn find_by_type(conditions: &[Condition], condition_type: ConditionType) -> Option<&Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}

/// Logical AND over the required condition types.
///
/// A missing required condition counts as not ready.
pub fn overall_ready(conditions: &[Condition]) -> bool {
    ConditionType::REQUIRED.iter().all(|t| {
        find_by_type(conditions, *t)
            .map(Condition::is_true)
            .unwrap_or(false)
    })
}

/// Check that no condition type appears twice.
pub fn check_unique(conditions: &[Condition]) -> Result<(), ConditionType> {
    for (i, c) in conditions.iter().enumerate() {
        if conditions[i + 1..]
            .iter()
            .any(|other| other.condition_type == c.condition_type)
        {
            return Err(c.condition_type);
        }
    }
    Ok(())
}

/// Set a condition, keeping transition times monotonic.
///
/// - Same status and reason: the existing time is kept; only the message is
///   refreshed.
/// - Different status or reason: the entry is replaced and stamped with `now`.
/// - Absent: the condition is inserted, ordered by type.
///
/// Returns `true` if the stored set changed.
///
/// # Panics
///
/// Panics if `conditions` already holds duplicate types.
pub fn set_condition(conditions: &mut Vec<Condition>, desired: Condition, now: DateTime<Utc>) -> bool {
    if let Err(duplicate) = check_unique(conditions) {
        panic!("condition set holds duplicate {} conditions", duplicate);
    }

    match conditions
        .iter_mut()
        .find(|c| c.condition_type == desired.condition_type)
    {
        Some(existing) if existing.same_transition_state(&desired) => {
            if existing.message == desired.message {
                false
            } else {
                existing.message = desired.message;
                true
            }
        }
        Some(existing) => {
            *existing = Condition {
                last_transition_time: format_time(now),
                ..desired
            };
            true
        }
        None => {
            conditions.push(Condition {
                last_transition_time: format_time(now),
                ..desired
            });
            conditions.sort_by_key(|c| c.condition_type);
            true
        }
    }
}

/// Format a timestamp the way condition times are stored.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored condition time.
pub fn parse_time(time: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(time)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ready(status: ConditionStatus, reason: ConditionReason) -> Condition {
        Condition::new(ConditionType::Ready, status).with_reason(reason)
    }

    #[test]
    fn set_inserts_and_stamps_time() {
        let mut conditions = Vec::new();
        let changed = set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::DeploymentNotAvailable),
            t0(),
        );

        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, "2024-01-15T10:30:00Z");
    }

    #[test]
    fn reapplying_identical_condition_is_a_noop() {
        let mut conditions = Vec::new();
        let c = ready(ConditionStatus::False, ConditionReason::DeploymentNotAvailable);
        set_condition(&mut conditions, c.clone(), t0());
        let before = conditions.clone();

        let changed = set_condition(&mut conditions, c, t0() + TimeDelta::seconds(30));

        assert!(!changed);
        assert_eq!(conditions, before);
    }

    #[test]
    fn message_only_change_keeps_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::DeploymentNotAvailable)
                .with_message("0/1 replicas"),
            t0(),
        );

        let changed = set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::DeploymentNotAvailable)
                .with_message("waiting for rollout"),
            t0() + TimeDelta::seconds(30),
        );

        assert!(changed);
        assert_eq!(conditions[0].message.as_deref(), Some("waiting for rollout"));
        assert_eq!(conditions[0].last_transition_time, "2024-01-15T10:30:00Z");
    }

    #[test]
    fn reason_change_advances_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::DeploymentNotAvailable),
            t0(),
        );
        set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::DeploymentFailed),
            t0() + TimeDelta::seconds(30),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, Some(ConditionReason::DeploymentFailed));
        assert_eq!(conditions[0].last_transition_time, "2024-01-15T10:30:30Z");
    }

    #[test]
    fn status_change_advances_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::DeploymentAvailable),
            t0(),
        );
        set_condition(
            &mut conditions,
            ready(ConditionStatus::True, ConditionReason::DeploymentAvailable),
            t0() + TimeDelta::minutes(2),
        );

        assert!(conditions[0].is_true());
        assert_eq!(conditions[0].last_transition_time, "2024-01-15T10:32:00Z");
    }

    #[test]
    fn conditions_are_kept_in_type_order() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            ready(ConditionStatus::False, ConditionReason::MissingDependency),
            t0(),
        );
        set_condition(
            &mut conditions,
            Condition::new(ConditionType::Augmentation, ConditionStatus::False)
                .with_reason(ConditionReason::SecretNotFound),
            t0(),
        );

        assert_eq!(conditions[0].condition_type, ConditionType::Augmentation);
        assert_eq!(conditions[1].condition_type, ConditionType::Ready);
    }

    #[test]
    fn overall_ready_matches_all_required_true() {
        let statuses = [
            None,
            Some(ConditionStatus::True),
            Some(ConditionStatus::False),
            Some(ConditionStatus::Unknown),
        ];

        for augmentation in statuses {
            for readiness in statuses {
                let mut conditions = Vec::new();
                if let Some(s) = augmentation {
                    set_condition(
                        &mut conditions,
                        Condition::new(ConditionType::Augmentation, s),
                        t0(),
                    );
                }
                if let Some(s) = readiness {
                    set_condition(&mut conditions, Condition::new(ConditionType::Ready, s), t0());
                }

                let expected = augmentation == Some(ConditionStatus::True)
                    && readiness == Some(ConditionStatus::True);
                assert_eq!(
                    overall_ready(&conditions),
                    expected,
                    "augmentation={:?} ready={:?}",
                    augmentation,
                    readiness
                );
            }
        }
    }

    #[test]
    fn find_by_type_returns_matching_condition() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            ready(ConditionStatus::True, ConditionReason::DeploymentAvailable),
            t0(),
        );

        assert!(find_by_type(&conditions, ConditionType::Ready).is_some());
        assert!(find_by_type(&conditions, ConditionType::Augmentation).is_none());
    }

    #[test]
    fn check_unique_reports_duplicates() {
        let duplicated = vec![
            Condition::new(ConditionType::Ready, ConditionStatus::True),
            Condition::new(ConditionType::Ready, ConditionStatus::False),
        ];
        assert_eq!(check_unique(&duplicated), Err(ConditionType::Ready));
    }

    #[test]
    #[should_panic(expected = "duplicate")]
    fn set_condition_fails_fast_on_duplicates() {
        let mut duplicated = vec![
            Condition::new(ConditionType::Ready, ConditionStatus::True),
            Condition::new(ConditionType::Ready, ConditionStatus::False),
        ];
        set_condition(
            &mut duplicated,
            Condition::new(ConditionType::Augmentation, ConditionStatus::True),
            t0(),
        );
    }

    #[test]
    fn condition_serializes_kubernetes_style() {
        let c = ready(ConditionStatus::False, ConditionReason::DeploymentFailed)
            .with_message("ReplicaFailure");
        let json = serde_json::to_value(&c).unwrap();

        assert_eq!(json["type"], "Ready");
        assert_eq!(json["status"], "False");
        assert_eq!(json["reason"], "DeploymentFailed");
        assert!(json.get("lastTransitionTime").is_some());
    }

    #[test]
    fn stored_time_round_trips() {
        assert_eq!(parse_time(&format_time(t0())), Some(t0()));
    }
}
