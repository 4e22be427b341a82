//! App registry endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use keel_control::{App, ControlPlane, CreateAppRequest};

use super::parse_app_id;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Response for app list.
#[derive(Debug, Serialize)]
pub struct ListAppsResponse {
    /// List of apps.
    pub apps: Vec<App>,
}

/// List all apps.
///
/// # Errors
///
/// Returns an error if the control plane operation fails.
pub async fn list_apps<C>(
    State(state): State<Arc<GatewayState<C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let apps = state.control.list_apps().await?;

    Ok(Json(ListAppsResponse { apps }))
}

/// Create a new app.
///
/// # Errors
///
/// Returns an error if the name is blank or the app cannot be stored.
pub async fn create_app<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Json(body): Json<CreateAppRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app = state.control.create_app(body).await?;

    Ok((StatusCode::CREATED, Json(app)))
}

/// Get a single app by ID.
///
/// # Errors
///
/// Returns an error if the app is not found.
pub async fn get_app<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(app_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
{
    let app_id = parse_app_id(&app_id)?;
    let app = state.control.get_app(&app_id).await?;

    Ok(Json(app))
}
