//! Dependency readiness gate for single-service deploys.

use std::collections::HashSet;

use keel_store::{Deployment, DeploymentStatus};

use crate::error::{ControlError, Result};

/// Names of services with at least one deployment currently `running`.
#[must_use]
pub fn running_services(deployments: &[Deployment]) -> HashSet<&str> {
    deployments
        .iter()
        .filter(|d| d.status == DeploymentStatus::Running)
        .map(|d| d.service_name.as_str())
        .collect()
}

/// Check that every direct dependency has a running deployment.
///
/// # Errors
///
/// Returns `ControlError::DependencyNotRunning` naming the first dependency,
/// in declaration order, that is not running.
pub fn check_dependencies_ready(depends_on: &[String], deployments: &[Deployment]) -> Result<()> {
    let running = running_services(deployments);

    match depends_on.iter().find(|dep| !running.contains(dep.as_str())) {
        Some(dep) => Err(ControlError::DependencyNotRunning(dep.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keel_core::{AppId, DeploymentId};
    use keel_store::{BuildType, RuntimeConfig};

    fn deployment(service: &str, status: DeploymentStatus) -> Deployment {
        Deployment {
            deployment_id: DeploymentId::generate(),
            app_id: AppId::from_bytes([1u8; 32]),
            service_name: service.to_string(),
            version: 1,
            git_ref: None,
            git_commit: None,
            build_type: BuildType::PureNix,
            artifact: None,
            status,
            node_id: None,
            config: RuntimeConfig::default(),
            depends_on: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_dependencies_is_always_ready() {
        assert!(check_dependencies_ready(&[], &[]).is_ok());
    }

    #[test]
    fn only_running_counts() {
        let deployments = vec![
            deployment("db", DeploymentStatus::Built),
            deployment("db", DeploymentStatus::Starting),
            deployment("cache", DeploymentStatus::Running),
        ];

        let result = check_dependencies_ready(&deps(&["cache", "db"]), &deployments);
        assert!(matches!(result, Err(ControlError::DependencyNotRunning(dep)) if dep == "db"));
    }

    #[test]
    fn any_running_deployment_satisfies() {
        let deployments = vec![
            deployment("db", DeploymentStatus::Failed),
            deployment("db", DeploymentStatus::Running),
        ];
        assert!(check_dependencies_ready(&deps(&["db"]), &deployments).is_ok());
    }

    #[test]
    fn first_unmet_dependency_is_reported() {
        let result = check_dependencies_ready(&deps(&["queue", "db"]), &[]);
        assert!(matches!(result, Err(ControlError::DependencyNotRunning(dep)) if dep == "queue"));
    }
}
