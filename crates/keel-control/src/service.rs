//! Control plane service implementation.
//!
//! This module provides the `ControlPlane` trait and `ControlPlaneService`
//! implementation that coordinates apps, deployments and build dispatch.
//!
//! Bulk deploys are a sequence of independent commits. A persistence failure
//! part way through a batch aborts the request but leaves the deployments
//! already created for earlier services in place.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use keel_core::{AppId, BuildId, DeploymentId};
use keel_store::{
    App, BuildJob, BuildStatus, Deployment, DeploymentStatus, ServiceConfig, Store,
};

use crate::build_job::{self, BuildJobOutcome};
use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::queue::BuildQueue;
use crate::readiness;
use crate::resolver;
use crate::service_state::ServiceStateView;
use crate::types::{
    BuildReport, CreateAppRequest, DeployOutcome, DeployRequest, DeploymentStatusReport,
    DispatchOutcome,
};
use crate::validation;

/// Trait defining the control plane operations.
///
/// This trait provides the complete API for managing apps and driving their
/// deployments. Implementations handle persistence, validation and dispatch
/// to the build pipeline.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // App Registry
    // =========================================================================

    /// Create a new app with no services.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if the name is blank.
    async fn create_app(&self, request: CreateAppRequest) -> Result<App>;

    /// Get an app by ID.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::AppNotFound` if the app doesn't exist.
    async fn get_app(&self, app_id: &AppId) -> Result<App>;

    /// List all apps.
    async fn list_apps(&self) -> Result<Vec<App>>;

    /// Validate and add a service to an app.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ServiceExists` for a duplicate name and
    /// `ControlError::Validation` for an invalid definition.
    async fn add_service(&self, app_id: &AppId, service: ServiceConfig) -> Result<ServiceConfig>;

    /// Remove a service, failing its in-flight builds and active deployments.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::HasDependents` while other services depend on it.
    async fn delete_service(&self, app_id: &AppId, service_name: &str) -> Result<()>;

    // =========================================================================
    // Deployment Lifecycle
    // =========================================================================

    /// Deploy every service of an app, or the one named in the request,
    /// in dependency order.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Store` if a deployment cannot be persisted.
    /// Deployments created for earlier services are kept.
    async fn deploy(&self, app_id: &AppId, request: DeployRequest) -> Result<Vec<DeployOutcome>>;

    /// Deploy a single service once its dependencies are running.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DependencyNotRunning` naming the first
    /// dependency without a running deployment.
    async fn deploy_service(
        &self,
        app_id: &AppId,
        service_name: &str,
        git_ref: Option<String>,
    ) -> Result<DeployOutcome>;

    /// Create a new deployment reusing the artifact of an earlier one.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::MissingArtifact` if the target has no artifact.
    async fn rollback(&self, deployment_id: &DeploymentId) -> Result<Deployment>;

    /// Get a deployment by ID.
    async fn get_deployment(&self, deployment_id: &DeploymentId) -> Result<Deployment>;

    /// List an app's deployments, most recent first.
    async fn list_deployments(&self, app_id: &AppId) -> Result<Vec<Deployment>>;

    /// List an app's build jobs, most recent first.
    async fn list_builds(&self, app_id: &AppId) -> Result<Vec<BuildJob>>;

    // =========================================================================
    // Service Actions
    // =========================================================================

    /// Current state of a service and the actions it offers.
    async fn service_state(&self, app_id: &AppId, service_name: &str) -> Result<ServiceStateView>;

    /// Stop the service's running deployment.
    async fn stop_service(&self, app_id: &AppId, service_name: &str) -> Result<Deployment>;

    /// Start the service's stopped deployment.
    async fn start_service(&self, app_id: &AppId, service_name: &str) -> Result<Deployment>;

    /// Restart the service's running deployment without rebuilding.
    async fn reload_service(&self, app_id: &AppId, service_name: &str) -> Result<Deployment>;

    /// Send the service's failed deployment back through the build pipeline.
    async fn retry_service(&self, app_id: &AppId, service_name: &str) -> Result<DeployOutcome>;

    // =========================================================================
    // Agent Reports
    // =========================================================================

    /// Record progress reported by a build worker.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidBuildState` for a report on a finished build
    /// and `ControlError::Validation` for a success without an artifact.
    async fn report_build(&self, build_id: &BuildId, report: BuildReport) -> Result<BuildJob>;

    /// Record a status change reported by the runtime.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidState` if the transition is not allowed.
    async fn report_deployment_status(
        &self,
        deployment_id: &DeploymentId,
        report: DeploymentStatusReport,
    ) -> Result<Deployment>;
}

/// The main control plane service implementation.
pub struct ControlPlaneService<S: Store> {
    store: Arc<S>,
    queue: Option<Arc<dyn BuildQueue>>,
}

impl<S: Store> ControlPlaneService<S> {
    /// Create a control plane that dispatches builds to `queue`.
    #[must_use]
    pub fn new(store: Arc<S>, queue: Arc<dyn BuildQueue>) -> Self {
        Self {
            store,
            queue: Some(queue),
        }
    }

    /// Create a control plane with no build queue.
    ///
    /// Build jobs are still persisted and report
    /// [`DispatchOutcome::QueueUnavailable`].
    #[must_use]
    pub fn without_queue(store: Arc<S>) -> Self {
        Self { store, queue: None }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a build queue is configured.
    #[must_use]
    pub const fn has_queue(&self) -> bool {
        self.queue.is_some()
    }

    fn load_app(&self, app_id: &AppId) -> Result<App> {
        self.store
            .get_app(app_id)?
            .ok_or(ControlError::AppNotFound(*app_id))
    }

    fn find_service<'a>(app: &'a App, service_name: &str) -> Result<&'a ServiceConfig> {
        app.service(service_name)
            .ok_or_else(|| ControlError::ServiceNotFound {
                app_id: app.app_id,
                service: service_name.to_string(),
            })
    }

    fn load_deployment(&self, deployment_id: &DeploymentId) -> Result<Deployment> {
        self.store
            .get_deployment(deployment_id)?
            .ok_or(ControlError::DeploymentNotFound(*deployment_id))
    }

    /// Most recent deployment of the service that is in `status`.
    ///
    /// Newer deployments in other states are skipped, so a stop still reaches
    /// the running deployment while a redeploy is in flight.
    fn latest_in_state(
        &self,
        app: &App,
        service_name: &str,
        status: DeploymentStatus,
    ) -> Result<Deployment> {
        Self::find_service(app, service_name)?;

        self.store
            .list_deployments_by_app(&app.app_id)?
            .into_iter()
            .find(|d| d.service_name == service_name && d.status == status)
            .ok_or_else(|| ControlError::NoDeploymentInState {
                service: service_name.to_string(),
                status,
            })
    }

    /// Create, persist and dispatch one deployment of `service`.
    async fn create_deployment_for(
        &self,
        app: &App,
        service: &ServiceConfig,
        git_ref_override: Option<&str>,
    ) -> Result<DeployOutcome> {
        let git_ref = git_ref_override
            .or_else(|| service.git_ref())
            .map(ToString::to_string);
        let version = self.store.next_version(&app.app_id, &service.name)?;
        let now = Utc::now();

        let deployment = Deployment {
            deployment_id: DeploymentId::generate(),
            app_id: app.app_id,
            service_name: service.name.clone(),
            version,
            git_ref,
            git_commit: None,
            build_type: build_job::build_type_for(&service.source),
            artifact: None,
            status: DeploymentStatus::Pending,
            node_id: None,
            config: service.runtime_config(),
            depends_on: service.depends_on.clone(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };

        self.store.create_deployment(&deployment)?;

        tracing::info!(
            deployment_id = %deployment.deployment_id,
            app_id = %app.app_id,
            service = %service.name,
            version,
            git_ref = deployment.git_ref.as_deref().unwrap_or_default(),
            "Created deployment"
        );

        let outcome = build_job::derive_and_persist(&*self.store, &deployment, service);
        let dispatch = self.dispatch(outcome).await;

        Ok(DeployOutcome {
            deployment,
            dispatch,
        })
    }

    async fn dispatch(&self, outcome: BuildJobOutcome) -> DispatchOutcome {
        match outcome {
            BuildJobOutcome::NotRequired => DispatchOutcome::NoBuildRequired,
            BuildJobOutcome::NotPersisted => DispatchOutcome::BuildNotPersisted,
            BuildJobOutcome::Persisted(job) => self.enqueue(&job).await,
        }
    }

    async fn enqueue(&self, job: &BuildJob) -> DispatchOutcome {
        let build_id = job.build_id;

        let Some(queue) = &self.queue else {
            tracing::warn!(
                job_id = %build_id,
                deployment_id = %job.deployment_id,
                "No build queue configured, build job left queued"
            );
            return DispatchOutcome::QueueUnavailable { build_id };
        };

        match queue.enqueue(job).await {
            Ok(()) => {
                tracing::debug!(job_id = %build_id, "Enqueued build job");
                DispatchOutcome::Enqueued { build_id }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    job_id = %build_id,
                    deployment_id = %job.deployment_id,
                    service = %job.service_name,
                    "Failed to enqueue build job"
                );
                DispatchOutcome::EnqueueFailed {
                    build_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Apply a user action's transition to the latest deployment in `from`.
    fn service_action(
        &self,
        app_id: &AppId,
        service_name: &str,
        from: DeploymentStatus,
        to: DeploymentStatus,
    ) -> Result<Deployment> {
        let app = self.load_app(app_id)?;
        let mut deployment = self.latest_in_state(&app, service_name, from)?;

        transition(&mut deployment, to)?;
        self.store.update_deployment(&deployment)?;

        tracing::info!(
            deployment_id = %deployment.deployment_id,
            service = %service_name,
            from = %from,
            to = %to,
            "Applied service action"
        );

        Ok(deployment)
    }
}

/// Validate and apply a deployment transition in memory.
fn transition(deployment: &mut Deployment, to: DeploymentStatus) -> Result<()> {
    lifecycle::validate_transition(&deployment.deployment_id, deployment.status, to)?;

    let now = Utc::now();
    deployment.status = to;
    deployment.updated_at = now;

    match to {
        DeploymentStatus::Running => {
            deployment.started_at = Some(now);
            deployment.finished_at = None;
        }
        DeploymentStatus::Stopped | DeploymentStatus::Failed => {
            deployment.finished_at = Some(now);
        }
        DeploymentStatus::Pending => {
            deployment.started_at = None;
            deployment.finished_at = None;
        }
        _ => {}
    }

    Ok(())
}

#[async_trait]
impl<S: Store + 'static> ControlPlane for ControlPlaneService<S> {
    // =========================================================================
    // App Registry
    // =========================================================================

    async fn create_app(&self, request: CreateAppRequest) -> Result<App> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ControlError::validation("name", "app name must not be empty"));
        }

        let now = Utc::now();
        let app = App {
            app_id: AppId::generate(name),
            name: name.to_string(),
            description: request.description,
            services: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.store.put_app(&app)?;

        tracing::info!(app_id = %app.app_id, name = %app.name, "Created app");

        Ok(app)
    }

    async fn get_app(&self, app_id: &AppId) -> Result<App> {
        self.load_app(app_id)
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        Ok(self.store.list_apps()?)
    }

    async fn add_service(&self, app_id: &AppId, service: ServiceConfig) -> Result<ServiceConfig> {
        let mut app = self.load_app(app_id)?;

        validation::validate_new_service(&app.services, &service)?;

        app.services.push(service.clone());
        app.updated_at = Utc::now();
        self.store.put_app(&app)?;

        tracing::info!(
            app_id = %app_id,
            service = %service.name,
            source_type = service.source.kind(),
            "Added service"
        );

        Ok(service)
    }

    async fn delete_service(&self, app_id: &AppId, service_name: &str) -> Result<()> {
        let mut app = self.load_app(app_id)?;
        Self::find_service(&app, service_name)?;

        let mut dependents: Vec<String> = app
            .services
            .iter()
            .filter(|s| s.depends_on.iter().any(|dep| dep == service_name))
            .map(|s| s.name.clone())
            .collect();
        if !dependents.is_empty() {
            dependents.sort();
            return Err(ControlError::HasDependents {
                service: service_name.to_string(),
                dependents,
            });
        }

        let now = Utc::now();

        let mut failed_builds = 0usize;
        for mut build in self.store.list_builds_by_app(app_id)? {
            if build.service_name == service_name && build.status.is_in_progress() {
                build.status = BuildStatus::Failed;
                build.finished_at = Some(now);
                self.store.update_build(&build)?;
                failed_builds += 1;
            }
        }

        let mut failed_deployments = 0usize;
        for mut deployment in self.store.list_deployments_by_app(app_id)? {
            if deployment.service_name == service_name && lifecycle::is_active(deployment.status) {
                transition(&mut deployment, DeploymentStatus::Failed)?;
                self.store.update_deployment(&deployment)?;
                failed_deployments += 1;
            }
        }

        app.services.retain(|s| s.name != service_name);
        app.updated_at = now;
        self.store.put_app(&app)?;

        tracing::info!(
            app_id = %app_id,
            service = %service_name,
            failed_builds,
            failed_deployments,
            "Deleted service"
        );

        Ok(())
    }

    // =========================================================================
    // Deployment Lifecycle
    // =========================================================================

    async fn deploy(&self, app_id: &AppId, request: DeployRequest) -> Result<Vec<DeployOutcome>> {
        let app = self.load_app(app_id)?;

        let services = match request.service_name.as_deref() {
            Some(name) => vec![Self::find_service(&app, name)?.clone()],
            None if app.services.is_empty() => vec![ServiceConfig::placeholder()],
            None => app.services.clone(),
        };

        let ordered = resolver::order_by_dependencies(services);
        let mut outcomes = Vec::with_capacity(ordered.len());

        for service in &ordered {
            let outcome = self
                .create_deployment_for(&app, service, request.git_ref.as_deref())
                .await?;
            outcomes.push(outcome);
        }

        tracing::info!(app_id = %app_id, deployments = outcomes.len(), "Deployed app");

        Ok(outcomes)
    }

    async fn deploy_service(
        &self,
        app_id: &AppId,
        service_name: &str,
        git_ref: Option<String>,
    ) -> Result<DeployOutcome> {
        let app = self.load_app(app_id)?;
        let service = Self::find_service(&app, service_name)?;

        if !service.depends_on.is_empty() {
            let deployments = self.store.list_deployments_by_app(app_id)?;
            readiness::check_dependencies_ready(&service.depends_on, &deployments)?;
        }

        let outcome = self
            .create_deployment_for(&app, service, git_ref.as_deref())
            .await?;

        if outcome.dispatch == DispatchOutcome::NoBuildRequired {
            tracing::warn!(
                deployment_id = %outcome.deployment.deployment_id,
                service = %service_name,
                source_type = service.source.kind(),
                "No build required for service deployment"
            );
        }

        Ok(outcome)
    }

    async fn rollback(&self, deployment_id: &DeploymentId) -> Result<Deployment> {
        let target = self.load_deployment(deployment_id)?;

        if !target.has_artifact() {
            return Err(ControlError::MissingArtifact(*deployment_id));
        }

        let version = self
            .store
            .next_version(&target.app_id, &target.service_name)?;
        let now = Utc::now();

        let deployment = Deployment {
            deployment_id: DeploymentId::generate(),
            app_id: target.app_id,
            service_name: target.service_name.clone(),
            version,
            git_ref: target.git_ref.clone(),
            git_commit: target.git_commit.clone(),
            build_type: target.build_type,
            artifact: target.artifact.clone(),
            status: DeploymentStatus::Built,
            node_id: None,
            config: target.config.clone(),
            depends_on: target.depends_on.clone(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };

        self.store.create_deployment(&deployment)?;

        tracing::info!(
            deployment_id = %deployment.deployment_id,
            rolled_back_from = %deployment_id,
            service = %deployment.service_name,
            version,
            "Created rollback deployment"
        );

        Ok(deployment)
    }

    async fn get_deployment(&self, deployment_id: &DeploymentId) -> Result<Deployment> {
        self.load_deployment(deployment_id)
    }

    async fn list_deployments(&self, app_id: &AppId) -> Result<Vec<Deployment>> {
        self.load_app(app_id)?;
        Ok(self.store.list_deployments_by_app(app_id)?)
    }

    async fn list_builds(&self, app_id: &AppId) -> Result<Vec<BuildJob>> {
        self.load_app(app_id)?;
        Ok(self.store.list_builds_by_app(app_id)?)
    }

    // =========================================================================
    // Service Actions
    // =========================================================================

    async fn service_state(&self, app_id: &AppId, service_name: &str) -> Result<ServiceStateView> {
        let app = self.load_app(app_id)?;
        Self::find_service(&app, service_name)?;

        let latest = self
            .store
            .list_deployments_by_app(app_id)?
            .into_iter()
            .find(|d| d.service_name == service_name);

        Ok(ServiceStateView::new(service_name, latest))
    }

    async fn stop_service(&self, app_id: &AppId, service_name: &str) -> Result<Deployment> {
        self.service_action(
            app_id,
            service_name,
            DeploymentStatus::Running,
            DeploymentStatus::Stopped,
        )
    }

    async fn start_service(&self, app_id: &AppId, service_name: &str) -> Result<Deployment> {
        self.service_action(
            app_id,
            service_name,
            DeploymentStatus::Stopped,
            DeploymentStatus::Running,
        )
    }

    async fn reload_service(&self, app_id: &AppId, service_name: &str) -> Result<Deployment> {
        self.service_action(
            app_id,
            service_name,
            DeploymentStatus::Running,
            DeploymentStatus::Starting,
        )
    }

    async fn retry_service(&self, app_id: &AppId, service_name: &str) -> Result<DeployOutcome> {
        let app = self.load_app(app_id)?;
        let service = Self::find_service(&app, service_name)?;
        let mut deployment = self.latest_in_state(&app, service_name, DeploymentStatus::Failed)?;

        transition(&mut deployment, DeploymentStatus::Pending)?;
        self.store.update_deployment(&deployment)?;

        let outcome = match self.store.get_build_by_deployment(&deployment.deployment_id)? {
            Some(mut build) => {
                if !build.status.is_in_progress() {
                    build.status = BuildStatus::Queued;
                    build.retry_count = build.retry_count.saturating_add(1);
                    build.started_at = None;
                    build.finished_at = None;
                    self.store.update_build(&build)?;
                }
                BuildJobOutcome::Persisted(build)
            }
            // The first build record was never written.
            None => build_job::derive_and_persist(&*self.store, &deployment, service),
        };
        let dispatch = self.dispatch(outcome).await;

        tracing::info!(
            deployment_id = %deployment.deployment_id,
            service = %service_name,
            dispatch = ?dispatch,
            "Retrying deployment"
        );

        Ok(DeployOutcome {
            deployment,
            dispatch,
        })
    }

    // =========================================================================
    // Agent Reports
    // =========================================================================

    async fn report_build(&self, build_id: &BuildId, report: BuildReport) -> Result<BuildJob> {
        let mut build = self
            .store
            .get_build(build_id)?
            .ok_or(ControlError::BuildNotFound(*build_id))?;
        let mut deployment = self.load_deployment(&build.deployment_id)?;

        lifecycle::validate_build_transition(build_id, build.status, report.status)?;

        let now = Utc::now();
        match report.status {
            BuildStatus::Running => {
                build.started_at = Some(now);
                if deployment.status == DeploymentStatus::Pending {
                    transition(&mut deployment, DeploymentStatus::Building)?;
                }
            }
            BuildStatus::Succeeded => {
                let artifact = report
                    .artifact
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        ControlError::validation("artifact", "a succeeded build must report an artifact")
                    })?;

                if deployment.status == DeploymentStatus::Pending {
                    transition(&mut deployment, DeploymentStatus::Building)?;
                }
                transition(&mut deployment, DeploymentStatus::Built)?;
                deployment.artifact = Some(artifact);
                if report.git_commit.is_some() {
                    deployment.git_commit = report.git_commit;
                }
                build.finished_at = Some(now);
            }
            BuildStatus::Failed => {
                if lifecycle::is_active(deployment.status) {
                    transition(&mut deployment, DeploymentStatus::Failed)?;
                }
                build.finished_at = Some(now);
            }
            // Rejected by the transition check above.
            BuildStatus::Queued => {}
        }
        build.status = report.status;

        self.store.update_build(&build)?;
        self.store.update_deployment(&deployment)?;

        tracing::info!(
            job_id = %build_id,
            deployment_id = %deployment.deployment_id,
            build_status = ?build.status,
            deployment_status = %deployment.status,
            "Recorded build report"
        );

        Ok(build)
    }

    async fn report_deployment_status(
        &self,
        deployment_id: &DeploymentId,
        report: DeploymentStatusReport,
    ) -> Result<Deployment> {
        let mut deployment = self.load_deployment(deployment_id)?;

        let from = deployment.status;
        transition(&mut deployment, report.status)?;
        if report.node_id.is_some() {
            deployment.node_id = report.node_id;
        }
        self.store.update_deployment(&deployment)?;

        tracing::debug!(
            deployment_id = %deployment_id,
            from = %from,
            to = %deployment.status,
            "Recorded deployment status"
        );

        Ok(deployment)
    }
}
