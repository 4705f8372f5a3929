//! Error types for cluster access.
//!
//! Every variant except [`ClusterError::Invariant`] is a transient
//! infrastructure failure: callers log it and retry on the next trigger.

use thiserror::Error;

/// Errors that can occur while talking to the cluster API.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The cluster API could not be reached.
    #[error("Cluster unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured timeout.
    #[error("Cluster call timed out after {0}ms")]
    Timeout(u64),

    /// Optimistic concurrency check failed on update.
    #[error("Resource version conflict on {kind}/{name}")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// An object the call depends on does not exist.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A programming error, never retried.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl ClusterError {
    /// Whether the error should be retried on the next trigger.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ClusterError::Invariant(_))
    }

    /// Whether the error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        match self {
            ClusterError::NotFound { .. } => true,
            ClusterError::Kube(kube::Error::Api(err)) => err.code == 404,
            _ => false,
        }
    }
}

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}
