//! HTTP gateway for the keel deployment control plane.
//!
//! This crate exposes the control plane over a JSON REST API. It handles:
//!
//! - App and service registration
//! - Deploy, rollback and service action triggers
//! - Internal report endpoints for build workers and the runtime
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Clients            Build workers / runtime     │
//! │               (/v1)                  (/internal)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       keel-gateway                          │
//! │          Router + Handlers, trace / CORS / limits           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌──────────────────────┐
//!                  │ ControlPlaneService  │
//!                  └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keel_gateway::{GatewayConfig, GatewayState, create_router};
//! use keel_control::ControlPlaneService;
//! use keel_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/keel")?);
//! let control = Arc::new(ControlPlaneService::without_queue(store));
//!
//! let state = GatewayState::new(control, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ConfigError, GatewayConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;
