//! Deployment endpoints.
//!
//! Deploy and rollback respond with `202 Accepted`: the deployment exists,
//! but building and running it happens asynchronously.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use keel_control::{BuildJob, ControlPlane, DeployOutcome, DeployRequest, Deployment};

use super::{optional_json, parse_app_id, parse_deployment_id};
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request body for deploying one service.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceDeployBody {
    /// Git ref overriding the service's configured ref.
    #[serde(default)]
    pub git_ref: Option<String>,
}

/// Response for an app deploy.
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    /// One entry per deployed service, in deploy order.
    pub deployments: Vec<DeployOutcome>,
}

/// Response for deployment list.
#[derive(Debug, Serialize)]
pub struct ListDeploymentsResponse {
    /// Deployments, most recent first.
    pub deployments: Vec<Deployment>,
}

/// Response for build list.
#[derive(Debug, Serialize)]
pub struct ListBuildsResponse {
    /// Build jobs, most recent first.
    pub builds: Vec<BuildJob>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Deploy an app's services in dependency order.
///
/// The body is optional. An empty body deploys every service at its
/// configured ref.
///
/// # Errors
///
/// Returns an error if the body is not valid JSON, if the app or named
/// service is not found, or if a deployment cannot be persisted.
pub async fn deploy<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(app_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let request: DeployRequest = optional_json(&headers, &body)?;

    let deployments = state.control.deploy(&app_id, request).await?;

    Ok((StatusCode::ACCEPTED, Json(DeployResponse { deployments })))
}

/// Deploy a single service.
///
/// # Errors
///
/// Returns an error if the body is not valid JSON, or if a dependency of the
/// service is not running.
pub async fn deploy_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let body: ServiceDeployBody = optional_json(&headers, &body)?;

    let outcome = state
        .control
        .deploy_service(&app_id, &service_name, body.git_ref)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// List an app's deployments.
///
/// # Errors
///
/// Returns an error if the app is not found.
pub async fn list_deployments<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(app_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let deployments = state.control.list_deployments(&app_id).await?;

    Ok(Json(ListDeploymentsResponse { deployments }))
}

/// List an app's build jobs.
///
/// # Errors
///
/// Returns an error if the app is not found.
pub async fn list_builds<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(app_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let builds = state.control.list_builds(&app_id).await?;

    Ok(Json(ListBuildsResponse { builds }))
}

/// Get a single deployment.
///
/// # Errors
///
/// Returns an error if the deployment is not found.
pub async fn get_deployment<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let deployment_id = parse_deployment_id(&deployment_id)?;
    let deployment = state.control.get_deployment(&deployment_id).await?;

    Ok(Json(deployment))
}

/// Roll back to a previous deployment's artifact.
///
/// # Errors
///
/// Returns an error if the deployment is not found or has no artifact.
pub async fn rollback<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let deployment_id = parse_deployment_id(&deployment_id)?;
    let deployment = state.control.rollback(&deployment_id).await?;

    Ok((StatusCode::ACCEPTED, Json(deployment)))
}
