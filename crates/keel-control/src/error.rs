//! Error types for the control plane.
//!
//! This module defines all errors that can occur while managing apps,
//! services, deployments and builds.

use keel_core::{AppId, BuildId, DeploymentId};
use keel_store::{BuildStatus, DeploymentStatus};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested app was not found.
    #[error("app not found: {0}")]
    AppNotFound(AppId),

    /// The app has no service with the requested name.
    #[error("service '{service}' not found in app {app_id}")]
    ServiceNotFound {
        /// The app that was searched.
        app_id: AppId,
        /// The missing service name.
        service: String,
    },

    /// The requested deployment was not found.
    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// The requested build was not found.
    #[error("build not found: {0}")]
    BuildNotFound(BuildId),

    /// A declared dependency has no running deployment.
    #[error("Dependency '{0}' is not running")]
    DependencyNotRunning(String),

    /// Rollback target has no artifact to reuse.
    #[error("cannot rollback to a deployment without an artifact")]
    MissingArtifact(DeploymentId),

    /// A service action found no deployment in the state it acts on.
    #[error("No {status} deployment found for service '{service}'")]
    NoDeploymentInState {
        /// The service the action targeted.
        service: String,
        /// The state the action requires.
        status: DeploymentStatus,
    },

    /// A request field failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The requested deployment state transition is not valid.
    #[error(
        "invalid state transition for deployment {deployment_id}: cannot transition from {from} to {to}"
    )]
    InvalidState {
        /// The deployment being transitioned.
        deployment_id: DeploymentId,
        /// The current state.
        from: DeploymentStatus,
        /// The requested target state.
        to: DeploymentStatus,
    },

    /// The build has already finished or cannot move to the reported state.
    #[error("invalid build transition for build {build_id}: cannot transition from {from:?} to {to:?}")]
    InvalidBuildState {
        /// The build being reported on.
        build_id: BuildId,
        /// The current build state.
        from: BuildStatus,
        /// The reported build state.
        to: BuildStatus,
    },

    /// A service with the same name already exists in the app.
    #[error("service '{0}' already exists")]
    ServiceExists(String),

    /// The service cannot be removed while other services depend on it.
    #[error("Cannot delete service '{service}': it is a dependency of {}", format_dependents(.dependents))]
    HasDependents {
        /// The service that was to be deleted.
        service: String,
        /// Services that declare it in `depends_on`.
        dependents: Vec<String>,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] keel_store::StoreError),

    /// Build queue error.
    #[error("build queue error: {0}")]
    Queue(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::AppNotFound(_)
            | Self::ServiceNotFound { .. }
            | Self::DeploymentNotFound(_)
            | Self::BuildNotFound(_) => 404,
            Self::DependencyNotRunning(_)
            | Self::MissingArtifact(_)
            | Self::NoDeploymentInState { .. }
            | Self::Validation { .. } => 400,
            Self::InvalidState { .. }
            | Self::InvalidBuildState { .. }
            | Self::ServiceExists(_)
            | Self::HasDependents { .. } => 409,
            Self::Store(_) | Self::Queue(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Queue(_) | Self::Internal(_))
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Join names as `a`, `a and b`, or `a, b and c`.
fn format_dependents(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
