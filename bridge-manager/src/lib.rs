//! Event Bridge Manager
//!
//! This crate owns the tenant side of event bridges: it accepts bridge and
//! processor requests, submits the desired resources the operator reconciles,
//! and follows their status until they are ready, failed or deleted.
//!
//! - [`Lifecycle`]: create, get, list and delete tenant records
//! - [`Sweeper`]: periodic pass advancing records from desired-resource status
//! - [`RecordStore`]: tenant record persistence with optimistic versions
//! - [`ActionValidators`]: processor action validation table
//!
//! # Example
//!
//! ```ignore
//! use bridge_manager::{Lifecycle, ManagerConfig, MemoryRecordStore};
//!
//! let lifecycle = Lifecycle::new(store, cluster, clock, ManagerConfig::from_env());
//! let bridge = lifecycle.create_bridge("acme", "orders").await?;
//! lifecycle.sweep().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod store;
pub mod sweep;

pub use actions::{ActionError, ActionValidators};
pub use config::ManagerConfig;
pub use error::{LifecycleError, LifecycleResult, StoreError, StoreResult};
pub use lifecycle::Lifecycle;
pub use model::{BaseAction, Phase, ProcessorDefinition, ProcessorRequest, RecordKind, TenantRecord};
pub use store::{MemoryRecordStore, RecordStore};
pub use sweep::{SweepReport, Sweeper};
