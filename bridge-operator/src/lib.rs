//! Event Bridge Kubernetes Operator
//!
//! This crate reconciles the desired resources of event bridges into running
//! workloads and reports their readiness.
//!
//! # Custom Resource Definitions
//!
//! - **BridgeIngress**: The CloudEvent ingestion endpoint of one bridge
//! - **BridgeExecutor**: The executor of one processor
//!
//! Both are turned into a Deployment and a Service that inject the tenant
//! credential Secret named like the resource. Readiness is reported through
//! `Augmentation` and `Ready` conditions.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: smartevents.io/v1alpha1
//! kind: BridgeIngress
//! metadata:
//!   name: ob-3f1c
//!   namespace: ob-acme
//! spec:
//!   bridgeId: 3f1c
//!   customerId: acme
//!   bridgeName: orders
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod error;
pub mod resources;

pub use config::OperatorConfig;
pub use controller::{ControllerContext, ReconcileOutcome, Reconciler, UpdateControl};
pub use error::{OperatorError, OperatorResult};
