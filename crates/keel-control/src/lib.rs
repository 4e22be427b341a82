//! Deployment orchestration for the keel control plane.
//!
//! This crate turns an app's declared services into versioned deployments
//! and build jobs, dispatches the jobs to the build pipeline, and drives each
//! deployment through its lifecycle as build and runtime agents report back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                      │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌────────────┐  │
//! │  │ Resolver  │ │ Readiness │ │ Build job │ │ Lifecycle  │  │
//! │  │           │ │ gate      │ │ deriver   │ │ state mach.│  │
//! │  └───────────┘ └───────────┘ └───────────┘ └────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//!         ┌────────────┐              ┌────────────┐
//!         │   Store    │              │ BuildQueue │
//!         │ (RocksDB)  │              │  (HTTP)    │
//!         └────────────┘              └────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use keel_control::{ControlPlane, ControlPlaneService, CreateAppRequest, DeployRequest, HttpBuildQueue};
//! use keel_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/keel")?);
//! let queue = Arc::new(HttpBuildQueue::new("http://builder:8081"));
//! let control = ControlPlaneService::new(store, queue);
//!
//! let app = control.create_app(CreateAppRequest::new("shop")).await?;
//! for outcome in control.deploy(&app.app_id, DeployRequest::default()).await? {
//!     println!("{} v{}", outcome.deployment.service_name, outcome.deployment.version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # State Machine
//!
//! Deployments move `pending → building → built → scheduled → starting →
//! running → stopping → stopped`, and can fail from any non-terminal state.
//! Users re-enter the machine with start, stop, reload and retry, and
//! rollback deployments start at `built`.
//!
//! See the [`lifecycle`] module for transition validation helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod build_job;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod readiness;
pub mod resolver;
pub mod service;
pub mod service_state;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

pub use build_job::BuildJobOutcome;
pub use error::{ControlError, Result};
pub use queue::{BuildQueue, HttpBuildQueue};
pub use service::{ControlPlane, ControlPlaneService};
pub use service_state::{ServiceAction, ServiceState, ServiceStateView};
pub use types::{
    BuildReport, CreateAppRequest, DeployOutcome, DeployRequest, DeploymentStatusReport,
    DispatchOutcome,
};

// Re-export commonly used types from dependencies
pub use keel_core::{AppId, BuildId, DeploymentId};
pub use keel_store::{App, BuildJob, BuildStatus, Deployment, DeploymentStatus, ServiceConfig};
