//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary app records, keyed by `app_id`.
    pub const APPS: &str = "apps";

    /// Primary deployment records, keyed by `deployment_id`.
    pub const DEPLOYMENTS: &str = "deployments";

    /// Index: deployments by app, keyed by `app_id || deployment_id`.
    pub const DEPLOYMENTS_BY_APP: &str = "deployments_by_app";

    /// Uniqueness index: `app_id || service || 0x00 || version` to `deployment_id`.
    pub const DEPLOYMENT_VERSIONS: &str = "deployment_versions";

    /// Last allocated version, keyed by `app_id || service`.
    pub const VERSION_COUNTERS: &str = "version_counters";

    /// Primary build records, keyed by `build_id`.
    pub const BUILDS: &str = "builds";

    /// Index: builds by app, keyed by `app_id || build_id`.
    pub const BUILDS_BY_APP: &str = "builds_by_app";

    /// Index: `deployment_id` to the deployment's `build_id`.
    pub const BUILDS_BY_DEPLOYMENT: &str = "builds_by_deployment";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::APPS,
        cf::DEPLOYMENTS,
        cf::DEPLOYMENTS_BY_APP,
        cf::DEPLOYMENT_VERSIONS,
        cf::VERSION_COUNTERS,
        cf::BUILDS,
        cf::BUILDS_BY_APP,
        cf::BUILDS_BY_DEPLOYMENT,
    ]
}
