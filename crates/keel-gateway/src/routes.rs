//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use keel_control::ControlPlane;

use crate::handlers::{apps, deployments, health, internal, services};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Apps
/// - `GET /v1/apps` - List apps
/// - `POST /v1/apps` - Create app
/// - `GET /v1/apps/:app_id` - Get app
/// - `POST /v1/apps/:app_id/deploy` - Deploy all services, or one
/// - `GET /v1/apps/:app_id/deployments` - List deployments
/// - `GET /v1/apps/:app_id/builds` - List build jobs
///
/// ## Services
/// - `POST /v1/apps/:app_id/services` - Add service
/// - `DELETE /v1/apps/:app_id/services/:service_name` - Delete service
/// - `GET /v1/apps/:app_id/services/:service_name/state` - Service state
/// - `POST /v1/apps/:app_id/services/:service_name/deploy` - Deploy service
/// - `POST /v1/apps/:app_id/services/:service_name/stop` - Stop service
/// - `POST /v1/apps/:app_id/services/:service_name/start` - Start service
/// - `POST /v1/apps/:app_id/services/:service_name/reload` - Reload service
/// - `POST /v1/apps/:app_id/services/:service_name/retry` - Retry service
///
/// ## Deployments
/// - `GET /v1/deployments/:deployment_id` - Get deployment
/// - `POST /v1/deployments/:deployment_id/rollback` - Roll back
///
/// ## Internal
/// - `GET /internal/health` - Agent connectivity check
/// - `POST /internal/builds/:build_id/report` - Build progress
/// - `POST /internal/deployments/:deployment_id/status` - Runtime status
pub fn create_router<C>(state: GatewayState<C>) -> Router
where
    C: ControlPlane + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health::<C>))
        // Apps
        .route(
            "/v1/apps",
            get(apps::list_apps::<C>).post(apps::create_app::<C>),
        )
        .route("/v1/apps/:app_id", get(apps::get_app::<C>))
        .route("/v1/apps/:app_id/deploy", post(deployments::deploy::<C>))
        .route(
            "/v1/apps/:app_id/deployments",
            get(deployments::list_deployments::<C>),
        )
        .route("/v1/apps/:app_id/builds", get(deployments::list_builds::<C>))
        // Services
        .route(
            "/v1/apps/:app_id/services",
            post(services::add_service::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name",
            delete(services::delete_service::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name/state",
            get(services::service_state::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name/deploy",
            post(deployments::deploy_service::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name/stop",
            post(services::stop_service::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name/start",
            post(services::start_service::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name/reload",
            post(services::reload_service::<C>),
        )
        .route(
            "/v1/apps/:app_id/services/:service_name/retry",
            post(services::retry_service::<C>),
        )
        // Deployments
        .route(
            "/v1/deployments/:deployment_id",
            get(deployments::get_deployment::<C>),
        )
        .route(
            "/v1/deployments/:deployment_id/rollback",
            post(deployments::rollback::<C>),
        )
        // Internal
        .route("/internal/health", get(internal::internal_health))
        .route(
            "/internal/builds/:build_id/report",
            post(internal::report_build::<C>),
        )
        .route(
            "/internal/deployments/:deployment_id/status",
            post(internal::update_deployment_status::<C>),
        )
        // Middleware, innermost first: each `Router::layer` call wraps the previous ones
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
