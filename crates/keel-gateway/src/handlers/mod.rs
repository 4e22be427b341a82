//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod apps;
pub mod deployments;
pub mod health;
pub mod internal;
pub mod services;

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::de::DeserializeOwned;

use keel_control::{AppId, BuildId, DeploymentId};

use crate::error::ApiError;

/// Decode a JSON body that may be omitted entirely.
///
/// An empty (or whitespace-only) body yields `T::default()`. Anything else
/// must carry a JSON content type and decode as `T`.
pub(crate) fn optional_json<T>(headers: &HeaderMap, body: &Bytes) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    if !has_json_content_type(headers) {
        return Err(ApiError::BadRequest(
            "Expected request with `Content-Type: application/json`".to_string(),
        ));
    }

    Json::<T>::from_bytes(body)
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

pub(crate) fn parse_app_id(raw: &str) -> Result<AppId, ApiError> {
    AppId::from_hex(raw).map_err(|e| ApiError::BadRequest(format!("invalid app id: {e}")))
}

pub(crate) fn parse_deployment_id(raw: &str) -> Result<DeploymentId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid deployment id: {e}")))
}

pub(crate) fn parse_build_id(raw: &str) -> Result<BuildId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid build id: {e}")))
}
