//! Logging setup shared by the bridge binaries.
//!
//! `BRIDGE_LOG_FORMAT` selects `json`, `pretty` or `compact` output; without
//! it terminals get `pretty` and everything else `json`. The filter comes
//! from `BRIDGE_LOG_LEVEL`, falling back to `RUST_LOG`.
//!
//! # Example
//!
//! ```ignore
//! use bridge_core::observability::{TracingConfig, init_tracing};
//!
//! init_tracing(&TracingConfig::from_env("bridge-manager"))?;
//! ```

mod config;
mod setup;

pub use config::{DEFAULT_FILTER, LogFormat, TracingConfig};
pub use setup::init_tracing;

/// Span for one reconciliation pass over a desired resource.
#[macro_export]
macro_rules! reconcile_span {
    ($key:expr) => {
        tracing::info_span!("reconcile", key = %$key)
    };
}

/// Span for one lifecycle operation on a tenant record.
#[macro_export]
macro_rules! lifecycle_span {
    ($operation:expr, $record_id:expr) => {
        tracing::info_span!(
            "lifecycle",
            operation = $operation,
            record_id = %$record_id
        )
    };
}
