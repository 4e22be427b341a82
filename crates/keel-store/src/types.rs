//! Domain types stored in the database.
//!
//! These types represent the persisted state of apps, their declared services,
//! deployments, and build jobs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use keel_core::{AppId, BuildId, DeploymentId};
use serde::{Deserialize, Serialize};

/// Name given to the synthetic service deployed for apps that declare none.
pub const DEFAULT_SERVICE_NAME: &str = "default";

/// An app record: a named collection of services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    /// Unique identifier for the app.
    pub app_id: AppId,
    /// Human-readable name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared services, in declaration order.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl App {
    /// Look up a declared service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// One deployable unit within an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name, unique within the app and DNS-safe.
    pub name: String,
    /// Where the service's code comes from.
    #[serde(flatten)]
    pub source: ServiceSource,
    /// Build strategy hint, passed through to the build job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_strategy: Option<BuildStrategy>,
    /// Build configuration hint, passed through to the build job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<BuildConfig>,
    /// CPU and memory allocation.
    #[serde(default)]
    pub resources: ResourceSpec,
    /// Number of instances to run.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Exposed ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    /// Health check settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,
    /// Service-level environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_vars: BTreeMap<String, String>,
    /// Names of services in the same app that must be running first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

const fn default_replicas() -> u32 {
    1
}

impl ServiceConfig {
    /// Create a service with the given source and default runtime settings.
    #[must_use]
    pub fn new(name: impl Into<String>, source: ServiceSource) -> Self {
        Self {
            name: name.into(),
            source,
            build_strategy: None,
            build_config: None,
            resources: ResourceSpec::default(),
            replicas: default_replicas(),
            ports: Vec::new(),
            health_check: None,
            env_vars: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// The synthetic service deployed for an app that declares no services.
    ///
    /// It has no recognised source, so it never produces a build job.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(DEFAULT_SERVICE_NAME, ServiceSource::Unknown)
    }

    /// The service's configured git ref, if it is a git service.
    #[must_use]
    pub fn git_ref(&self) -> Option<&str> {
        match &self.source {
            ServiceSource::Git { git_ref, .. } => git_ref.as_deref(),
            _ => None,
        }
    }

    /// Snapshot the runtime settings copied onto each new deployment.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            resources: self.resources.clone(),
            replicas: self.replicas,
            env_vars: self.env_vars.clone(),
            ports: self.ports.clone(),
            health_check: self.health_check.clone(),
        }
    }
}

/// Source of a service, tagged by `source_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum ServiceSource {
    /// A git repository, optionally with a flake output to build.
    Git {
        /// Repository URL.
        git_repo: String,
        /// Branch, tag or commit to build by default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        /// Flake output attribute to build.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flake_output: Option<String>,
    },
    /// A self-contained flake URI.
    Flake {
        /// Flake reference, e.g. `github:owner/repo#pkg`.
        flake_uri: String,
    },
    /// A managed database engine.
    Database {
        /// Optional flake overriding the engine's default build.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flake_uri: Option<String>,
        /// Engine and version.
        database: DatabaseSpec,
    },
    /// A prebuilt OCI image. No longer accepted for new services.
    Image {
        /// Image reference.
        image: String,
    },
    /// A source type this build does not recognise.
    #[serde(other)]
    Unknown,
}

impl ServiceSource {
    /// The `source_type` tag of this source.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Git { .. } => "git",
            Self::Flake { .. } => "flake",
            Self::Database { .. } => "database",
            Self::Image { .. } => "image",
            Self::Unknown => "unknown",
        }
    }
}

/// Database engine descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Engine name, e.g. `postgres`.
    #[serde(rename = "type")]
    pub engine: String,
    /// Engine version. Empty means the engine default.
    #[serde(default)]
    pub version: String,
}

/// Build strategy hint understood by the build workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStrategy {
    /// Build an existing flake.
    Flake,
    /// Generate a flake for a Go project.
    AutoGo,
    /// Generate a flake for a Rust project.
    AutoRust,
    /// Generate a flake for a Node.js project.
    AutoNode,
    /// Generate a flake for a Python project.
    AutoPython,
    /// Build a managed database engine.
    AutoDatabase,
    /// Build from a Dockerfile.
    Dockerfile,
    /// Build with nixpacks.
    Nixpacks,
    /// Let the worker detect the project type.
    Auto,
}

impl BuildStrategy {
    /// Wire name of the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flake => "flake",
            Self::AutoGo => "auto-go",
            Self::AutoRust => "auto-rust",
            Self::AutoNode => "auto-node",
            Self::AutoPython => "auto-python",
            Self::AutoDatabase => "auto-database",
            Self::Dockerfile => "dockerfile",
            Self::Nixpacks => "nixpacks",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative build hints passed to the build workers unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Command that builds the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    /// Command that starts the built project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    /// Entry point file or module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    /// Environment visible during the build.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_vars: BTreeMap<String, String>,
    /// Engine options, set on database builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_options: Option<DatabaseOptions>,
}

/// Database engine options attached to a database build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseOptions {
    /// Engine name.
    #[serde(rename = "type")]
    pub engine: String,
    /// Engine version.
    pub version: String,
}

/// How a deployment's artifact is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
    /// Built with nix into a closure.
    #[serde(rename = "pure-nix")]
    PureNix,
    /// Pulled as an OCI image.
    #[serde(rename = "oci")]
    Oci,
}

/// CPU and memory allocation, in the runtime's string notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU quantity, e.g. `0.5`.
    pub cpu: String,
    /// Memory quantity, e.g. `512Mi`.
    pub memory: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu: "0.5".to_string(),
            memory: "512Mi".to_string(),
        }
    }
}

/// A port exposed by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// `tcp` or `udp`. Defaults to `tcp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Health check settings for a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// HTTP path to probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Port to probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Seconds between probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u32>,
    /// Seconds before a probe times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    /// Failed probes before the instance is unhealthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// Runtime settings snapshotted onto a deployment at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// CPU and memory allocation.
    #[serde(default)]
    pub resources: ResourceSpec,
    /// Number of instances.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_vars: BTreeMap<String, String>,
    /// Exposed ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    /// Health check settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,
}

/// One versioned attempt to run a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique identifier.
    pub deployment_id: DeploymentId,
    /// Owning app.
    pub app_id: AppId,
    /// Service this deployment runs.
    pub service_name: String,
    /// Per-(app, service) version, starting at 1.
    pub version: u32,
    /// Git ref the deployment was requested for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Commit resolved by the build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    /// How the artifact is produced.
    pub build_type: BuildType,
    /// Reference to the runnable build output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Current lifecycle state.
    pub status: DeploymentStatus,
    /// Node the deployment was scheduled onto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Runtime settings copied from the service.
    #[serde(default)]
    pub config: RuntimeConfig,
    /// Dependency names copied from the service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the deployment first reached `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the deployment reached `stopped` or `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Whether this deployment carries a reusable artifact.
    #[must_use]
    pub fn has_artifact(&self) -> bool {
        self.artifact.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Lifecycle states for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Created, waiting for a build.
    Pending,
    /// Build in progress.
    Building,
    /// Artifact available, not yet placed.
    Built,
    /// Assigned to a node.
    Scheduled,
    /// Instances starting.
    Starting,
    /// Serving.
    Running,
    /// Graceful shutdown in progress.
    Stopping,
    /// Shut down.
    Stopped,
    /// Build or runtime failure.
    Failed,
}

impl DeploymentStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Built => "built",
            Self::Scheduled => "scheduled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work handed to the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    /// Unique identifier.
    pub build_id: BuildId,
    /// Deployment the build produces an artifact for.
    pub deployment_id: DeploymentId,
    /// Owning app.
    pub app_id: AppId,
    /// Service being built.
    pub service_name: String,
    /// Repository URL for git sources, flake URI for flake and database sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    /// Ref to check out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Flake output attribute to build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flake_output: Option<String>,
    /// How the artifact is produced.
    pub build_type: BuildType,
    /// Strategy hint for the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_strategy: Option<BuildStrategy>,
    /// Build configuration hint for the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<BuildConfig>,
    /// Current build state.
    pub status: BuildStatus,
    /// Number of times the build was retried.
    #[serde(default)]
    pub retry_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When a worker picked the build up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the build finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Lifecycle states for a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Waiting for a worker.
    Queued,
    /// A worker is building.
    Running,
    /// Artifact produced.
    Succeeded,
    /// Build failed or was cancelled.
    Failed,
}

impl BuildStatus {
    /// Whether the build has not finished yet.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_source_serializes_with_tag() {
        let service = ServiceConfig::new(
            "api",
            ServiceSource::Git {
                git_repo: "https://github.com/acme/api".to_string(),
                git_ref: Some("main".to_string()),
                flake_output: None,
            },
        );
        let json = serde_json::to_value(&service).unwrap();
        assert_eq!(json["source_type"], "git");
        assert_eq!(json["git_repo"], "https://github.com/acme/api");
        assert_eq!(json["replicas"], 1);
        assert!(json.get("flake_output").is_none());
    }

    #[test]
    fn database_source_parses() {
        let service: ServiceConfig = serde_json::from_value(serde_json::json!({
            "name": "db",
            "source_type": "database",
            "database": { "type": "postgres", "version": "16" },
            "build_strategy": "auto-database"
        }))
        .unwrap();
        assert_eq!(
            service.source,
            ServiceSource::Database {
                flake_uri: None,
                database: DatabaseSpec {
                    engine: "postgres".to_string(),
                    version: "16".to_string(),
                },
            }
        );
        assert_eq!(service.build_strategy, Some(BuildStrategy::AutoDatabase));
    }

    #[test]
    fn unrecognised_source_type_parses_as_unknown() {
        let service: ServiceConfig = serde_json::from_value(serde_json::json!({
            "name": "legacy",
            "source_type": "buildpack"
        }))
        .unwrap();
        assert_eq!(service.source, ServiceSource::Unknown);
    }

    #[test]
    fn runtime_config_snapshot_is_independent() {
        let mut service = ServiceConfig::new(
            "api",
            ServiceSource::Flake {
                flake_uri: "github:acme/api".to_string(),
            },
        );
        service.env_vars.insert("PORT".to_string(), "8080".to_string());
        let snapshot = service.runtime_config();
        service.env_vars.insert("PORT".to_string(), "9090".to_string());
        assert_eq!(snapshot.env_vars["PORT"], "8080");
    }

    #[test]
    fn placeholder_service() {
        let service = ServiceConfig::placeholder();
        assert_eq!(service.name, DEFAULT_SERVICE_NAME);
        assert_eq!(service.source.kind(), "unknown");
        assert!(service.git_ref().is_none());
    }

    #[test]
    fn build_type_wire_names() {
        assert_eq!(serde_json::to_string(&BuildType::PureNix).unwrap(), "\"pure-nix\"");
        assert_eq!(serde_json::to_string(&BuildType::Oci).unwrap(), "\"oci\"");
        assert_eq!(BuildStrategy::AutoDatabase.to_string(), "auto-database");
    }
}
