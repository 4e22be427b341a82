//! Service definition and service action endpoints.
//!
//! Actions apply to the service's most recent deployment in the state the
//! action starts from, and respond with the updated deployment.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use keel_control::{ControlPlane, ServiceConfig};

use super::parse_app_id;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Add a service to an app.
///
/// # Errors
///
/// Returns an error if the app is not found or the service is invalid.
pub async fn add_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(app_id): Path<String>,
    Json(body): Json<ServiceConfig>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let service = state.control.add_service(&app_id, body).await?;

    Ok((StatusCode::CREATED, Json(service)))
}

/// Delete a service, failing its in-flight work.
///
/// # Errors
///
/// Returns an error if other services still depend on it.
pub async fn delete_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    state.control.delete_service(&app_id, &service_name).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Get a service's derived state and available actions.
///
/// # Errors
///
/// Returns an error if the app or service is not found.
pub async fn service_state<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let view = state.control.service_state(&app_id, &service_name).await?;

    Ok(Json(view))
}

/// Stop the service's running deployment.
///
/// # Errors
///
/// Returns an error if no deployment of the service is running.
pub async fn stop_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let deployment = state.control.stop_service(&app_id, &service_name).await?;

    Ok(Json(deployment))
}

/// Start the service's stopped deployment.
///
/// # Errors
///
/// Returns an error if no deployment of the service is stopped.
pub async fn start_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let deployment = state.control.start_service(&app_id, &service_name).await?;

    Ok(Json(deployment))
}

/// Restart the service's running deployment without rebuilding.
///
/// # Errors
///
/// Returns an error if no deployment of the service is running.
pub async fn reload_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let deployment = state.control.reload_service(&app_id, &service_name).await?;

    Ok(Json(deployment))
}

/// Retry the service's failed deployment.
///
/// # Errors
///
/// Returns an error if no deployment of the service has failed.
pub async fn retry_service<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((app_id, service_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let outcome = state.control.retry_service(&app_id, &service_name).await?;

    Ok(Json(outcome))
}
