//! Derivation of build jobs from a service's source.
//!
//! Every source variant is matched explicitly, so adding a variant to
//! [`ServiceSource`] does not compile until it is handled here.

use chrono::Utc;
use keel_core::BuildId;
use keel_store::{
    BuildJob, BuildStatus, BuildStrategy, BuildType, DatabaseOptions, Deployment, ServiceConfig,
    ServiceSource, Store,
};

use crate::validation::default_database_version;

/// Result of deriving and persisting the build job for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildJobOutcome {
    /// The source needs no build.
    NotRequired,
    /// A job was derived but its record could not be written. It must not be enqueued.
    NotPersisted,
    /// The job record is durable and may be enqueued.
    Persisted(BuildJob),
}

/// How a source's artifact is produced.
#[must_use]
pub const fn build_type_for(source: &ServiceSource) -> BuildType {
    match source {
        ServiceSource::Image { .. } => BuildType::Oci,
        ServiceSource::Git { .. }
        | ServiceSource::Flake { .. }
        | ServiceSource::Database { .. }
        | ServiceSource::Unknown => BuildType::PureNix,
    }
}

/// Derive the build job for a freshly created deployment of `service`.
///
/// The deployment's `git_ref` is the effective ref: the caller's override or
/// the service default. Returns `None` when the source needs no build.
#[must_use]
pub fn derive(deployment: &Deployment, service: &ServiceConfig) -> Option<BuildJob> {
    let (git_url, git_ref, flake_output, build_strategy, build_config) = match &service.source {
        ServiceSource::Git {
            git_repo,
            flake_output,
            ..
        } => (
            Some(git_repo.clone()),
            deployment.git_ref.clone(),
            flake_output.clone(),
            service.build_strategy,
            service.build_config.clone(),
        ),
        // The URI is self-contained, so ref and output stay empty.
        ServiceSource::Flake { flake_uri } => (
            Some(flake_uri.clone()),
            None,
            None,
            Some(service.build_strategy.unwrap_or(BuildStrategy::Flake)),
            service.build_config.clone(),
        ),
        ServiceSource::Database {
            flake_uri,
            database,
        } => {
            let url = flake_uri.clone().filter(|uri| !uri.is_empty());
            let strategy = match (service.build_strategy, &url) {
                (Some(strategy), Some(_)) => strategy,
                _ => BuildStrategy::AutoDatabase,
            };
            let version = if database.version.is_empty() {
                default_database_version(&database.engine)
                    .unwrap_or_default()
                    .to_string()
            } else {
                database.version.clone()
            };
            let mut config = service.build_config.clone().unwrap_or_default();
            config.database_options = Some(DatabaseOptions {
                engine: database.engine.clone(),
                version,
            });
            (url, None, None, Some(strategy), Some(config))
        }
        ServiceSource::Image { .. } | ServiceSource::Unknown => return None,
    };

    Some(BuildJob {
        build_id: BuildId::generate(),
        deployment_id: deployment.deployment_id,
        app_id: deployment.app_id,
        service_name: service.name.clone(),
        git_url,
        git_ref,
        flake_output,
        build_type: deployment.build_type,
        build_strategy,
        build_config,
        status: BuildStatus::Queued,
        retry_count: 0,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
    })
}

/// Derive the build job for `deployment` and persist it.
///
/// A job whose record cannot be written is reported as
/// [`BuildJobOutcome::NotPersisted`] and must never reach the queue.
pub fn derive_and_persist<S: Store + ?Sized>(
    store: &S,
    deployment: &Deployment,
    service: &ServiceConfig,
) -> BuildJobOutcome {
    let Some(job) = derive(deployment, service) else {
        return BuildJobOutcome::NotRequired;
    };

    let strategy = job.build_strategy.map(BuildStrategy::as_str).unwrap_or_default();

    if let Err(e) = store.create_build(&job) {
        tracing::error!(
            error = %e,
            job_id = %job.build_id,
            deployment_id = %deployment.deployment_id,
            service = %service.name,
            source_type = service.source.kind(),
            build_strategy = strategy,
            "Failed to create build record"
        );
        return BuildJobOutcome::NotPersisted;
    }

    tracing::info!(
        job_id = %job.build_id,
        deployment_id = %deployment.deployment_id,
        service = %service.name,
        source_type = service.source.kind(),
        build_strategy = strategy,
        "Created build job"
    );

    BuildJobOutcome::Persisted(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FaultyStore;
    use keel_core::{AppId, DeploymentId};
    use keel_store::{BuildConfig, DatabaseSpec, DeploymentStatus, RocksStore};
    use tempfile::TempDir;

    fn deployment_for(service: &ServiceConfig, git_ref: Option<&str>) -> Deployment {
        Deployment {
            deployment_id: DeploymentId::generate(),
            app_id: AppId::from_bytes([3u8; 32]),
            service_name: service.name.clone(),
            version: 1,
            git_ref: git_ref.map(ToString::to_string),
            git_commit: None,
            build_type: build_type_for(&service.source),
            artifact: None,
            status: DeploymentStatus::Pending,
            node_id: None,
            config: service.runtime_config(),
            depends_on: service.depends_on.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn database_service(flake_uri: Option<&str>, strategy: Option<BuildStrategy>) -> ServiceConfig {
        let mut service = ServiceConfig::new(
            "db",
            ServiceSource::Database {
                flake_uri: flake_uri.map(ToString::to_string),
                database: DatabaseSpec {
                    engine: "postgres".to_string(),
                    version: "15".to_string(),
                },
            },
        );
        service.build_strategy = strategy;
        service
    }

    #[test]
    fn git_source_copies_repository_fields() {
        let mut service = ServiceConfig::new(
            "api",
            ServiceSource::Git {
                git_repo: "https://github.com/acme/shop".to_string(),
                git_ref: Some("main".to_string()),
                flake_output: Some("packages.x86_64-linux.api".to_string()),
            },
        );
        service.build_strategy = Some(BuildStrategy::AutoRust);
        service.build_config = Some(BuildConfig {
            build_command: Some("cargo build --release".to_string()),
            ..BuildConfig::default()
        });
        let deployment = deployment_for(&service, Some("v1.2.0"));

        let job = derive(&deployment, &service).unwrap();
        assert_eq!(job.git_url.as_deref(), Some("https://github.com/acme/shop"));
        assert_eq!(job.git_ref.as_deref(), Some("v1.2.0"));
        assert_eq!(job.flake_output.as_deref(), Some("packages.x86_64-linux.api"));
        assert_eq!(job.build_type, BuildType::PureNix);
        assert_eq!(job.build_strategy, Some(BuildStrategy::AutoRust));
        assert_eq!(job.build_config, service.build_config);
        assert_eq!(job.deployment_id, deployment.deployment_id);
        assert_eq!(job.status, BuildStatus::Queued);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn flake_source_defaults_strategy_and_clears_ref() {
        let service = ServiceConfig::new(
            "web",
            ServiceSource::Flake {
                flake_uri: "github:acme/web#default".to_string(),
            },
        );
        let job = derive(&deployment_for(&service, Some("main")), &service).unwrap();

        assert_eq!(job.git_url.as_deref(), Some("github:acme/web#default"));
        assert!(job.git_ref.is_none());
        assert!(job.flake_output.is_none());
        assert_eq!(job.build_strategy, Some(BuildStrategy::Flake));
    }

    #[test]
    fn flake_source_keeps_explicit_strategy() {
        let mut service = ServiceConfig::new(
            "web",
            ServiceSource::Flake {
                flake_uri: "github:acme/web".to_string(),
            },
        );
        service.build_strategy = Some(BuildStrategy::Nixpacks);
        let job = derive(&deployment_for(&service, None), &service).unwrap();
        assert_eq!(job.build_strategy, Some(BuildStrategy::Nixpacks));
    }

    #[test]
    fn database_without_uri_always_uses_auto_database() {
        for strategy in [None, Some(BuildStrategy::Flake), Some(BuildStrategy::Dockerfile)] {
            let service = database_service(None, strategy);
            let job = derive(&deployment_for(&service, None), &service).unwrap();

            assert!(job.git_url.is_none());
            assert_eq!(job.build_strategy, Some(BuildStrategy::AutoDatabase));
            assert_eq!(
                job.build_config.unwrap().database_options,
                Some(DatabaseOptions {
                    engine: "postgres".to_string(),
                    version: "15".to_string(),
                })
            );
        }
    }

    #[test]
    fn database_with_uri_honours_explicit_strategy() {
        let service = database_service(Some("github:acme/pg"), Some(BuildStrategy::Flake));
        let job = derive(&deployment_for(&service, None), &service).unwrap();
        assert_eq!(job.git_url.as_deref(), Some("github:acme/pg"));
        assert_eq!(job.build_strategy, Some(BuildStrategy::Flake));

        let unset = database_service(Some("github:acme/pg"), None);
        let job = derive(&deployment_for(&unset, None), &unset).unwrap();
        assert_eq!(job.build_strategy, Some(BuildStrategy::AutoDatabase));
    }

    #[test]
    fn database_empty_version_resolves_to_default() {
        let service = ServiceConfig::new(
            "cache",
            ServiceSource::Database {
                flake_uri: None,
                database: DatabaseSpec {
                    engine: "redis".to_string(),
                    version: String::new(),
                },
            },
        );
        let job = derive(&deployment_for(&service, None), &service).unwrap();
        assert_eq!(
            job.build_config.unwrap().database_options.unwrap().version,
            "7.2"
        );
    }

    #[test]
    fn database_options_merge_into_existing_config() {
        let mut service = database_service(None, None);
        service.build_config = Some(BuildConfig {
            start_command: Some("postgres -D /data".to_string()),
            ..BuildConfig::default()
        });
        let job = derive(&deployment_for(&service, None), &service).unwrap();
        let config = job.build_config.unwrap();
        assert_eq!(config.start_command.as_deref(), Some("postgres -D /data"));
        assert!(config.database_options.is_some());
    }

    #[test]
    fn image_and_unknown_sources_need_no_build() {
        let image = ServiceConfig::new(
            "legacy",
            ServiceSource::Image {
                image: "nginx:1.27".to_string(),
            },
        );
        let deployment = deployment_for(&image, None);
        assert_eq!(deployment.build_type, BuildType::Oci);
        assert!(derive(&deployment, &image).is_none());

        let placeholder = ServiceConfig::placeholder();
        assert!(derive(&deployment_for(&placeholder, None), &placeholder).is_none());
    }

    #[test]
    fn persisted_job_is_readable_by_deployment() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let service = database_service(None, None);
        let deployment = deployment_for(&service, None);

        let BuildJobOutcome::Persisted(job) = derive_and_persist(&store, &deployment, &service)
        else {
            panic!("expected persisted job");
        };

        let stored = store
            .get_build_by_deployment(&deployment.deployment_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored, job);
    }

    #[test]
    fn failed_persistence_suppresses_job() {
        let (store, _dir) = FaultyStore::open();
        store.fail_create_build(true);
        let service = database_service(None, None);
        let deployment = deployment_for(&service, None);

        assert_eq!(
            derive_and_persist(&store, &deployment, &service),
            BuildJobOutcome::NotPersisted
        );
        assert!(store
            .get_build_by_deployment(&deployment.deployment_id)
            .unwrap()
            .is_none());
        assert_eq!(
            derive_and_persist(&store, &deployment, &ServiceConfig::placeholder()),
            BuildJobOutcome::NotRequired
        );
    }
}
