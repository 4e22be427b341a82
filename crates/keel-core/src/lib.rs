//! Core types for the keel control plane.
//!
//! This crate provides the identifiers shared by every other keel crate:
//!
//! - **Identifiers**: Strongly-typed IDs for apps, deployments, and builds
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use keel_core::{AppId, BuildId, DeploymentId};
//!
//! // Generate an app ID from its name
//! let app_id = AppId::generate("shop");
//! let parsed = AppId::from_hex(&app_id.to_hex()).unwrap();
//! assert_eq!(app_id, parsed);
//!
//! // Deployments and builds are identified by random UUIDs
//! let deployment_id = DeploymentId::generate();
//! let build_id = BuildId::generate();
//! assert_ne!(deployment_id.to_string(), build_id.to_string());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{AppId, BuildId, DeploymentId, IdError};
