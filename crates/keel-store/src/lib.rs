//! `RocksDB` storage layer for keel.
//!
//! This crate provides persistent storage for apps, deployments, and build jobs
//! using `RocksDB` with column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `apps`: Primary app records (with their declared services), keyed by `app_id`
//! - `deployments`: Primary deployment records, keyed by `deployment_id`
//! - `deployments_by_app`: Index for listing deployments by app
//! - `deployment_versions`: Uniqueness index over `(app, service, version)`
//! - `version_counters`: Last allocated version per `(app, service)`
//! - `builds`: Primary build job records, keyed by `build_id`
//! - `builds_by_app`: Index for listing builds by app
//! - `builds_by_deployment`: Index from a deployment to its build
//!
//! # Example
//!
//! ```no_run
//! use keel_store::{RocksStore, Store};
//! use keel_core::AppId;
//!
//! let store = RocksStore::open("/tmp/keel-db").unwrap();
//!
//! let app_id = AppId::from_bytes([0u8; 32]);
//! let version = store.next_version(&app_id, "api").unwrap();
//! let deployments = store.list_deployments_by_app(&app_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    App, BuildConfig, BuildJob, BuildStatus, BuildStrategy, BuildType, DatabaseOptions,
    DatabaseSpec, Deployment, DeploymentStatus, HealthCheckConfig, PortMapping, ResourceSpec,
    RuntimeConfig, ServiceConfig, ServiceSource, DEFAULT_SERVICE_NAME,
};

use keel_core::{AppId, BuildId, DeploymentId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, or wrappers that inject failures in tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // App Operations
    // =========================================================================

    /// Insert or update an app record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_app(&self, app: &App) -> Result<()>;

    /// Get an app by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_app(&self, app_id: &AppId) -> Result<Option<App>>;

    /// List all apps.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_apps(&self) -> Result<Vec<App>>;

    // =========================================================================
    // Deployment Operations
    // =========================================================================

    /// Allocate the next version for an `(app, service)` pair.
    ///
    /// Versions start at 1 and are never handed out twice, including to
    /// concurrent callers. A version whose deployment is never created is
    /// simply skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn next_version(&self, app_id: &AppId, service_name: &str) -> Result<u32>;

    /// Insert a new deployment record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the deployment ID or its
    /// `(app, service, version)` triple is already taken.
    fn create_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Get a deployment by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_deployment(&self, deployment_id: &DeploymentId) -> Result<Option<Deployment>>;

    /// List an app's deployments, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_deployments_by_app(&self, app_id: &AppId) -> Result<Vec<Deployment>>;

    /// Overwrite an existing deployment record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the deployment doesn't exist.
    fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    // =========================================================================
    // Build Operations
    // =========================================================================

    /// Insert a new build job record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the build ID is already taken.
    fn create_build(&self, build: &BuildJob) -> Result<()>;

    /// Get a build by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_build(&self, build_id: &BuildId) -> Result<Option<BuildJob>>;

    /// Get the build job that produces a deployment's artifact, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_build_by_deployment(&self, deployment_id: &DeploymentId) -> Result<Option<BuildJob>>;

    /// Overwrite an existing build record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the build doesn't exist.
    fn update_build(&self, build: &BuildJob) -> Result<()>;

    /// List an app's builds, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_builds_by_app(&self, app_id: &AppId) -> Result<Vec<BuildJob>>;
}
