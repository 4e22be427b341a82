//! Request and response types for control plane operations.
//!
//! These types define the API contracts for app management, deployment and
//! the reports sent back by build and runtime agents.

use keel_core::BuildId;
use keel_store::{BuildStatus, Deployment, DeploymentStatus};
use serde::{Deserialize, Serialize};

/// Request to create a new app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppRequest {
    /// Human-readable name for the app.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateAppRequest {
    /// Create a new request with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Request to deploy an app, or one of its services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Git ref overriding each service's configured ref.
    #[serde(default)]
    pub git_ref: Option<String>,
    /// Restrict the deploy to this service.
    #[serde(default)]
    pub service_name: Option<String>,
}

/// A deployment together with what happened to its build job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    /// The created deployment.
    pub deployment: Deployment,
    /// Whether the build job reached the queue.
    pub dispatch: DispatchOutcome,
}

/// What happened to a deployment's build job after the deployment was persisted.
///
/// Only [`DispatchOutcome::Enqueued`] and [`DispatchOutcome::NoBuildRequired`]
/// leave the deployment able to progress without out-of-band reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The job is persisted and the queue accepted it.
    Enqueued {
        /// The build job.
        build_id: BuildId,
    },
    /// The service's source needs no build.
    NoBuildRequired,
    /// The job record could not be written, so it was not enqueued.
    BuildNotPersisted,
    /// The job is persisted but no queue is configured.
    QueueUnavailable {
        /// The build job.
        build_id: BuildId,
    },
    /// The job is persisted but the queue rejected it.
    EnqueueFailed {
        /// The build job.
        build_id: BuildId,
        /// The queue's error.
        reason: String,
    },
}

impl DispatchOutcome {
    /// Returns true if nothing further is needed for the deployment to progress.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Enqueued { .. } | Self::NoBuildRequired)
    }

    /// The build job this outcome refers to, if one was persisted.
    #[must_use]
    pub const fn build_id(&self) -> Option<&BuildId> {
        match self {
            Self::Enqueued { build_id }
            | Self::QueueUnavailable { build_id }
            | Self::EnqueueFailed { build_id, .. } => Some(build_id),
            Self::NoBuildRequired | Self::BuildNotPersisted => None,
        }
    }
}

/// Progress report from a build worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// The build's new state.
    pub status: BuildStatus,
    /// Reference to the produced artifact. Required when `status` is `succeeded`.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Commit the build resolved the ref to.
    #[serde(default)]
    pub git_commit: Option<String>,
}

/// Status report from the runtime for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusReport {
    /// The deployment's new state.
    pub status: DeploymentStatus,
    /// Node the deployment was placed on, when scheduling.
    #[serde(default)]
    pub node_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_outcome_wire_format() {
        let build_id = BuildId::generate();
        let json = serde_json::to_value(DispatchOutcome::EnqueueFailed {
            build_id,
            reason: "queue full".to_string(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "enqueue_failed");
        assert_eq!(json["build_id"], build_id.to_string());

        let json = serde_json::to_value(DispatchOutcome::NoBuildRequired).unwrap();
        assert_eq!(json, serde_json::json!({ "outcome": "no_build_required" }));
    }

    #[test]
    fn dispatch_completeness() {
        let build_id = BuildId::generate();
        assert!(DispatchOutcome::Enqueued { build_id }.is_complete());
        assert!(DispatchOutcome::NoBuildRequired.is_complete());
        assert!(!DispatchOutcome::BuildNotPersisted.is_complete());
        assert!(!DispatchOutcome::QueueUnavailable { build_id }.is_complete());
        assert_eq!(
            DispatchOutcome::QueueUnavailable { build_id }.build_id(),
            Some(&build_id)
        );
    }

    #[test]
    fn deploy_request_fields_are_optional() {
        let request: DeployRequest = serde_json::from_str("{}").unwrap();
        assert!(request.git_ref.is_none());
        assert!(request.service_name.is_none());
    }
}
