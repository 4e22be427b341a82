//! Common error types for keel.

use crate::ids::{AppId, DeploymentId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the keel system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An app with the specified ID was not found.
    #[error("app not found: {0}")]
    AppNotFound(AppId),

    /// A deployment with the specified ID was not found.
    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
