//! User-facing service state, derived from the latest deployment.

use keel_store::{Deployment, DeploymentStatus};
use serde::{Deserialize, Serialize};

/// Summary state of a service as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Never deployed.
    New,
    /// A deployment is on its way to running.
    Deploying,
    /// The latest deployment is serving.
    Running,
    /// The latest deployment is stopping or stopped.
    Stopped,
    /// The latest deployment failed.
    Failed,
}

/// Action a user can take on a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    /// First deployment.
    Deploy,
    /// Stop the running deployment.
    Stop,
    /// Restart the running deployment without rebuilding.
    Reload,
    /// Deploy a fresh build.
    Rebuild,
    /// Start the stopped deployment.
    Start,
    /// Send the failed deployment through the pipeline again.
    Retry,
}

impl ServiceState {
    /// Derive the state from the service's most recent deployment.
    #[must_use]
    pub fn derive(latest: Option<&Deployment>) -> Self {
        let Some(deployment) = latest else {
            return Self::New;
        };

        match deployment.status {
            DeploymentStatus::Pending
            | DeploymentStatus::Building
            | DeploymentStatus::Built
            | DeploymentStatus::Scheduled
            | DeploymentStatus::Starting => Self::Deploying,
            DeploymentStatus::Running => Self::Running,
            DeploymentStatus::Stopping | DeploymentStatus::Stopped => Self::Stopped,
            DeploymentStatus::Failed => Self::Failed,
        }
    }

    /// Actions that make sense in this state.
    #[must_use]
    pub const fn available_actions(self) -> &'static [ServiceAction] {
        match self {
            Self::New => &[ServiceAction::Deploy],
            Self::Deploying => &[],
            Self::Running => &[ServiceAction::Stop, ServiceAction::Reload, ServiceAction::Rebuild],
            Self::Stopped => &[ServiceAction::Start, ServiceAction::Rebuild],
            Self::Failed => &[ServiceAction::Retry, ServiceAction::Rebuild],
        }
    }

    /// Whether `action` is offered in this state.
    #[must_use]
    pub fn allows(self, action: ServiceAction) -> bool {
        self.available_actions().contains(&action)
    }
}

/// State of one service together with its latest deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateView {
    /// Service name.
    pub service_name: String,
    /// Derived state.
    pub state: ServiceState,
    /// Actions offered in that state.
    pub available_actions: Vec<ServiceAction>,
    /// The deployment the state was derived from.
    pub latest_deployment: Option<Deployment>,
}

impl ServiceStateView {
    /// Build the view for a service from its most recent deployment.
    #[must_use]
    pub fn new(service_name: impl Into<String>, latest: Option<Deployment>) -> Self {
        let state = ServiceState::derive(latest.as_ref());
        Self {
            service_name: service_name.into(),
            state,
            available_actions: state.available_actions().to_vec(),
            latest_deployment: latest,
        }
    }
}
