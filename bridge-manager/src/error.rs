//! Error types for tenant lifecycle management.

use bridge_core::ClusterError;
use thiserror::Error;

/// Errors raised by a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A record with the same id already exists.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A live record already uses the name in its scope.
    #[error("Name '{name}' is already in use")]
    DuplicateName {
        /// The contested name.
        name: String,
    },

    /// The record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record changed since it was read.
    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Record id.
        id: String,
        /// Version the caller read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The request clashes with an existing record.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No visible record with this id exists for the customer.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Requested id.
        id: String,
    },

    /// The bridge exists but is not ready.
    #[error("Bridge {0} is not ready")]
    BridgeNotReady(String),

    /// The processor action was rejected.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// The bridge still has processors.
    #[error("Bridge {bridge_id} still has {count} processor(s)")]
    HasProcessors {
        /// Bridge id.
        bridge_id: String,
        /// Number of live processors.
        count: usize,
    },

    /// Cluster access error.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Record store error.
    #[error(transparent)]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LifecycleError {
    /// Whether the error is a rejection of the tenant's request rather than
    /// an infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LifecycleError::Conflict(_)
                | LifecycleError::NotFound { .. }
                | LifecycleError::BridgeNotReady(_)
                | LifecycleError::InvalidAction(_)
                | LifecycleError::HasProcessors { .. }
        )
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateName { name } => {
                LifecycleError::Conflict(format!("name '{}' is already in use", name))
            }
            other => LifecycleError::Store(other),
        }
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        LifecycleError::Serialization(err.to_string())
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
