//! Deployment lifecycle state machine.
//!
//! This module defines the valid state transitions for deployments and provides
//! validation logic to ensure state machine invariants are maintained.
//!
//! # State Machine
//!
//! ```text
//!   Pending ──▶ Building ──▶ Built ──▶ Scheduled ──▶ Starting ──▶ Running
//!      ▲                       ▲                         ▲           │
//!      │ (retry)               │ (rollback enters here)  │ (reload)  │
//!      │                                                 └───────────┤
//!      │                                                             │ (stop)
//!   Failed ◀── any non-terminal state             Stopping ◀─────────┤
//!                                                    │               │
//!                                                    ▼               ▼
//!                                                 Stopped ──(start)──▶ Running
//! ```

use keel_core::{BuildId, DeploymentId};
use keel_store::{BuildStatus, DeploymentStatus};

use crate::error::{ControlError, Result};

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidState` if the transition is not allowed.
pub fn validate_transition(
    deployment_id: &DeploymentId,
    from: DeploymentStatus,
    to: DeploymentStatus,
) -> Result<DeploymentStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidState {
            deployment_id: *deployment_id,
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: DeploymentStatus, to: DeploymentStatus) -> bool {
    use DeploymentStatus::{
        Building, Built, Failed, Pending, Running, Scheduled, Starting, Stopped, Stopping,
    };

    matches!(
        (from, to),
        (Pending, Building)
            | (Building, Built)
            | (Built, Scheduled)
            | (Scheduled, Starting)
            | (Starting, Running)
            // stop, or the runtime reporting it went away on its own
            | (Running, Stopping | Stopped)
            | (Stopping, Stopped)
            // reload
            | (Running, Starting)
            // start
            | (Stopped, Running)
            // retry
            | (Failed, Pending)
            | (Pending | Building | Built | Scheduled | Starting | Running | Stopping, Failed)
    )
}

/// Returns the list of valid target states from the given state.
#[must_use]
pub fn valid_transitions_from(state: DeploymentStatus) -> Vec<DeploymentStatus> {
    use DeploymentStatus::{
        Building, Built, Failed, Pending, Running, Scheduled, Starting, Stopped, Stopping,
    };

    match state {
        Pending => vec![Building, Failed],
        Building => vec![Built, Failed],
        Built => vec![Scheduled, Failed],
        Scheduled => vec![Starting, Failed],
        Starting => vec![Running, Failed],
        Running => vec![Stopping, Stopped, Starting, Failed],
        Stopping => vec![Stopped, Failed],
        Stopped => vec![Running],
        Failed => vec![Pending],
    }
}

/// Returns true if the deployment is in a terminal state (stopped or failed).
///
/// Terminal states only leave through an explicit user action.
#[must_use]
pub const fn is_terminal(state: DeploymentStatus) -> bool {
    matches!(state, DeploymentStatus::Stopped | DeploymentStatus::Failed)
}

/// Returns true once status consumers can stop waiting for further changes.
#[must_use]
pub const fn is_streaming_terminal(state: DeploymentStatus) -> bool {
    matches!(
        state,
        DeploymentStatus::Running | DeploymentStatus::Stopped | DeploymentStatus::Failed
    )
}

/// Returns true if the deployment still holds or awaits resources.
#[must_use]
pub const fn is_active(state: DeploymentStatus) -> bool {
    !is_terminal(state)
}

/// Check if a build worker may move a build from `from` to `to`.
///
/// Finished builds only leave their state through a retry, which resets the
/// record rather than transitioning it.
#[must_use]
pub const fn is_valid_build_transition(from: BuildStatus, to: BuildStatus) -> bool {
    use BuildStatus::{Failed, Queued, Running, Succeeded};

    matches!(
        (from, to),
        (Queued, Running) | (Queued | Running, Succeeded | Failed)
    )
}

/// Validates a build report's transition.
///
/// # Errors
///
/// Returns `ControlError::InvalidBuildState` if the transition is not allowed.
pub fn validate_build_transition(
    build_id: &BuildId,
    from: BuildStatus,
    to: BuildStatus,
) -> Result<BuildStatus> {
    if is_valid_build_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidBuildState {
            build_id: *build_id,
            from,
            to,
        })
    }
}
