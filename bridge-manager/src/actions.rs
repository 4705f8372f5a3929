//! Processor action validation.
//!
//! Action types are dispatched through an [`ActionValidators`] table that is
//! assembled once at startup and never mutated afterwards. Parameters are
//! checked before the table is consulted: an action without parameters is
//! rejected regardless of its type.

use crate::model::BaseAction;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Type tag of the Kafka topic action.
pub const KAFKA_TOPIC_ACTION: &str = "KafkaTopicAction";

/// Type tag of the webhook action.
pub const WEBHOOK_ACTION: &str = "Webhook";

/// Parameter naming the target topic of a Kafka topic action.
pub const TOPIC_PARAM: &str = "topic";

/// Parameter naming the target URL of a webhook action.
pub const ENDPOINT_PARAM: &str = "endpoint";

/// Message of a rejected Kafka topic.
pub const INVALID_TOPIC_PARAM_MESSAGE: &str = "The supplied topic parameter is not valid";

/// Message of a rejected webhook endpoint.
pub const INVALID_ENDPOINT_PARAM_MESSAGE: &str =
    "The supplied endpoint parameter must be an http or https URL";

/// Outcome of a single validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the parameters are acceptable.
    pub valid: bool,
    /// Why they are not, if the validator says.
    pub message: Option<String>,
}

impl ValidationResult {
    /// Parameters accepted.
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    /// Parameters rejected.
    pub fn invalid(message: Option<String>) -> Self {
        Self {
            valid: false,
            message,
        }
    }
}

/// Validates the parameters of one action type.
pub type ActionValidator = fn(&BTreeMap<String, String>) -> ValidationResult;

/// Why an action was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// No validator is registered for the type.
    #[error("Action of type '{0}' is not recognised")]
    UnknownActionType(String),

    /// The parameters were rejected.
    #[error("{message}")]
    InvalidParameters {
        /// Action type.
        action_type: String,
        /// Validator message, or a generic one.
        message: String,
    },
}

/// Immutable table of action validators keyed by type tag.
#[derive(Debug, Clone)]
pub struct ActionValidators {
    table: HashMap<String, ActionValidator>,
}

impl Default for ActionValidators {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ActionValidators {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Table with the built-in action types.
    pub fn builtin() -> Self {
        Self::empty()
            .with_validator(KAFKA_TOPIC_ACTION, validate_kafka_topic)
            .with_validator(WEBHOOK_ACTION, validate_webhook)
    }

    /// Register a validator while building the table.
    pub fn with_validator(
        mut self,
        action_type: impl Into<String>,
        validator: ActionValidator,
    ) -> Self {
        self.table.insert(action_type.into(), validator);
        self
    }

    /// Registered type tags, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.table.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Validate an action.
    pub fn validate(&self, action: &BaseAction) -> Result<(), ActionError> {
        let Some(parameters) = action.parameters.as_ref() else {
            return Err(invalid(&action.action_type, None));
        };

        let validator = self
            .table
            .get(&action.action_type)
            .ok_or_else(|| ActionError::UnknownActionType(action.action_type.clone()))?;

        let result = validator(parameters);
        if result.valid {
            Ok(())
        } else {
            Err(invalid(&action.action_type, result.message))
        }
    }
}

fn invalid(action_type: &str, message: Option<String>) -> ActionError {
    ActionError::InvalidParameters {
        action_type: action_type.to_string(),
        message: message
            .unwrap_or_else(|| format!("Parameters for action '{}' are not valid", action_type)),
    }
}

/// Kafka topic actions need a non-empty `topic`.
///
/// The value is not trimmed or checked against broker naming rules.
pub fn validate_kafka_topic(parameters: &BTreeMap<String, String>) -> ValidationResult {
    match parameters.get(TOPIC_PARAM) {
        Some(topic) if !topic.is_empty() => ValidationResult::valid(),
        _ => ValidationResult::invalid(Some(INVALID_TOPIC_PARAM_MESSAGE.to_string())),
    }
}

/// Webhook actions need an `endpoint` with an http or https scheme and a host.
pub fn validate_webhook(parameters: &BTreeMap<String, String>) -> ValidationResult {
    let has_host = |endpoint: &str| {
        ["https://", "http://"]
            .iter()
            .find_map(|scheme| endpoint.strip_prefix(scheme))
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
    };

    match parameters.get(ENDPOINT_PARAM) {
        Some(endpoint) if has_host(endpoint.trim()) => ValidationResult::valid(),
        _ => ValidationResult::invalid(Some(INVALID_ENDPOINT_PARAM_MESSAGE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject_silently(_: &BTreeMap<String, String>) -> ValidationResult {
        ValidationResult::invalid(None)
    }

    fn accept_all(_: &BTreeMap<String, String>) -> ValidationResult {
        ValidationResult::valid()
    }

    #[test]
    fn kafka_topic_is_required() {
        let validators = ActionValidators::builtin();
        assert!(
            validators
                .validate(&BaseAction::new(KAFKA_TOPIC_ACTION, [("topic", "orders")]))
                .is_ok()
        );

        let err = validators
            .validate(&BaseAction::new(KAFKA_TOPIC_ACTION, [("topic", "")]))
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_TOPIC_PARAM_MESSAGE);

        let err = validators
            .validate(&BaseAction::new(
                KAFKA_TOPIC_ACTION,
                Vec::<(String, String)>::new(),
            ))
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_TOPIC_PARAM_MESSAGE);
    }

    #[test]
    fn kafka_topic_is_only_checked_for_emptiness() {
        let validators = ActionValidators::builtin();
        for topic in [" ", "orders.v1", "ORDERS"] {
            assert!(
                validators
                    .validate(&BaseAction::new(KAFKA_TOPIC_ACTION, [("topic", topic)]))
                    .is_ok(),
                "{:?} should be accepted",
                topic
            );
        }
    }

    #[test]
    fn webhook_needs_http_endpoint() {
        let validators = ActionValidators::builtin();
        for ok in ["https://hooks.example.com/in", "http://10.0.0.1:8080"] {
            assert!(
                validators
                    .validate(&BaseAction::new(WEBHOOK_ACTION, [("endpoint", ok)]))
                    .is_ok(),
                "{} should be accepted",
                ok
            );
        }
        for bad in ["ftp://example.com", "https://", "example.com", "http:///path"] {
            assert!(
                validators
                    .validate(&BaseAction::new(WEBHOOK_ACTION, [("endpoint", bad)]))
                    .is_err(),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn missing_parameters_skip_the_table() {
        let validators = ActionValidators::empty();
        let action = BaseAction {
            action_type: "NotRegistered".to_string(),
            parameters: None,
        };
        let err = validators.validate(&action).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameters { .. }));
    }

    #[test]
    fn unknown_type_is_reported() {
        let validators = ActionValidators::builtin();
        let err = validators
            .validate(&BaseAction::new("SlackAction", [("channel", "ops")]))
            .unwrap_err();
        assert_eq!(err, ActionError::UnknownActionType("SlackAction".to_string()));
    }

    #[test]
    fn empty_parameters_reach_the_validator() {
        let validators = ActionValidators::empty().with_validator("Noop", accept_all);
        let action = BaseAction::new("Noop", Vec::<(String, String)>::new());
        assert!(validators.validate(&action).is_ok());
    }

    #[test]
    fn silent_rejection_gets_generic_message() {
        let validators = ActionValidators::empty().with_validator("Strict", reject_silently);
        let err = validators
            .validate(&BaseAction::new("Strict", [("a", "b")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameters for action 'Strict' are not valid");
    }

    #[test]
    fn builtin_types() {
        assert_eq!(
            ActionValidators::builtin().action_types(),
            vec![KAFKA_TOPIC_ACTION, WEBHOOK_ACTION]
        );
    }
}
