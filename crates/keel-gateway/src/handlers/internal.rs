//! Internal API endpoints.
//!
//! These endpoints are called by the build workers and the runtime to report
//! progress. They are NOT exposed externally.
//!
//! # Security
//!
//! Internal endpoints should be protected by network policies that only allow
//! traffic from the build and runtime agents.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use keel_control::{BuildReport, ControlPlane, DeploymentStatusReport};

use super::{parse_build_id, parse_deployment_id};
use crate::error::ApiError;
use crate::state::GatewayState;

/// Record a build worker's progress report.
///
/// # Errors
///
/// Returns an error if the build is unknown, already finished, or reported
/// as succeeded without an artifact.
pub async fn report_build<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(build_id): Path<String>,
    Json(body): Json<BuildReport>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let build_id = parse_build_id(&build_id)?;

    tracing::info!(
        job_id = %build_id,
        status = ?body.status,
        "Received build report"
    );

    let build = state.control.report_build(&build_id, body).await?;

    Ok(Json(build))
}

/// Record a deployment status change from the runtime.
///
/// # Errors
///
/// Returns an error if the deployment is unknown or the transition is invalid.
pub async fn update_deployment_status<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(deployment_id): Path<String>,
    Json(body): Json<DeploymentStatusReport>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let deployment_id = parse_deployment_id(&deployment_id)?;

    tracing::info!(
        deployment_id = %deployment_id,
        new_status = %body.status,
        node_id = ?body.node_id,
        "Received status update from runtime"
    );

    let deployment = state
        .control
        .report_deployment_status(&deployment_id, body)
        .await?;

    Ok(Json(deployment))
}

/// Health check for internal services.
///
/// This is a simple endpoint that agents can use to verify connectivity.
pub async fn internal_health() -> impl IntoResponse {
    #[derive(Serialize)]
    struct InternalHealthResponse {
        status: &'static str,
    }

    Json(InternalHealthResponse { status: "ok" })
}
