//! Build queue client.
//!
//! The build pipeline consumes jobs from a queue service. This module provides
//! the `BuildQueue` seam and an HTTP implementation of it.

use std::time::Duration;

use async_trait::async_trait;
use keel_store::BuildJob;
use serde::Deserialize;

use crate::error::{ControlError, Result};

/// Trait for handing build jobs to the build pipeline.
///
/// Delivery is at-least-once: consumers must tolerate a job arriving twice.
#[async_trait]
pub trait BuildQueue: Send + Sync {
    /// Enqueue a persisted build job.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Queue` if the queue cannot accept the job.
    async fn enqueue(&self, job: &BuildJob) -> Result<()>;
}

/// HTTP client for the build queue service.
#[derive(Debug, Clone)]
pub struct HttpBuildQueue {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBuildQueue {
    /// Create a new build queue client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the queue service (e.g., "http://build-queue:8080")
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, base_url)
    }

    /// Create a new build queue client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the queue service.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Error response from the queue service.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl BuildQueue for HttpBuildQueue {
    async fn enqueue(&self, job: &BuildJob) -> Result<()> {
        let url = format!("{}/v1/jobs", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(job)
            .send()
            .await
            .map_err(|e| ControlError::Queue(format!("request failed: {e}")))?;

        if response.status().is_success() {
            tracing::debug!(job_id = %job.build_id, "Enqueued build job");
            return Ok(());
        }

        let status = response.status();
        let error = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("queue returned status {status}"));

        Err(ControlError::Queue(error))
    }
}
