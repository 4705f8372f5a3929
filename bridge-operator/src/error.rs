//! Error types for the bridge operator.

use bridge_core::ClusterError;
use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Cluster access error.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The desired resource cannot be reconciled as submitted.
    #[error("Invalid resource {kind}/{name}: {reason}")]
    InvalidResource {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Why the resource is unusable.
        reason: String,
    },

    /// A stored status violates the condition model.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl OperatorError {
    /// Whether the error should be retried on the next trigger.
    pub fn is_transient(&self) -> bool {
        match self {
            OperatorError::KubeError(_) => true,
            OperatorError::Cluster(err) => err.is_transient(),
            OperatorError::InvalidResource { .. }
            | OperatorError::Invariant(_)
            | OperatorError::InvalidConfig(_)
            | OperatorError::SerializationError(_) => false,
        }
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_transience_is_preserved() {
        let err: OperatorError = ClusterError::Timeout(100).into();
        assert!(err.is_transient());

        let err: OperatorError = ClusterError::Invariant("bad".into()).into();
        assert!(!err.is_transient());
    }

    #[test]
    fn invariant_errors_are_permanent() {
        assert!(!OperatorError::Invariant("duplicate Ready".into()).is_transient());
    }
}
