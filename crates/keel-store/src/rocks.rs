//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use keel_core::{AppId, BuildId, DeploymentId};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{App, BuildJob, Deployment};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serialises read-modify-write sequences: version allocation and
    /// uniqueness-checked inserts.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!("Opened RocksDB store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_pinned_cf(&cf, key)
            .map(|value| value.is_some())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Read a version counter, treating a missing key as zero.
    fn read_counter(&self, key: &[u8]) -> Result<u32> {
        let cf = self.cf(cf::VERSION_COUNTERS)?;
        let Some(raw) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(0);
        };
        let bytes: [u8; 4] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization(format!("corrupt version counter: {} bytes", raw.len())))?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Collect the primary keys referenced by an `app_id || id` index.
    fn scan_app_index(&self, cf_name: &str, app_id: &AppId) -> Result<Vec<Box<[u8]>>> {
        let cf_index = self.cf(cf_name)?;
        let prefix = keys::app_prefix(app_id);

        let mut found = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_index,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            found.push(key);
        }

        Ok(found)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // App Operations
    // =========================================================================

    fn put_app(&self, app: &App) -> Result<()> {
        let cf = self.cf(cf::APPS)?;
        let key = keys::app_key(&app.app_id);
        let value = Self::serialize(app)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_app(&self, app_id: &AppId) -> Result<Option<App>> {
        self.get_value(cf::APPS, &keys::app_key(app_id))
    }

    fn list_apps(&self) -> Result<Vec<App>> {
        let cf = self.cf(cf::APPS)?;

        let mut apps = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let app: App = Self::deserialize(&value)?;
            apps.push(app);
        }

        apps.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apps)
    }

    // =========================================================================
    // Deployment Operations
    // =========================================================================

    fn next_version(&self, app_id: &AppId, service_name: &str) -> Result<u32> {
        let cf_counters = self.cf(cf::VERSION_COUNTERS)?;
        let key = keys::service_key(app_id, service_name);

        let _guard = self.write_lock.lock();
        let next = self
            .read_counter(&key)?
            .checked_add(1)
            .ok_or_else(|| StoreError::Database(format!("version space exhausted for {service_name}")))?;

        self.db
            .put_cf(&cf_counters, &key, next.to_be_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(next)
    }

    fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        let cf_deployments = self.cf(cf::DEPLOYMENTS)?;
        let cf_by_app = self.cf(cf::DEPLOYMENTS_BY_APP)?;
        let cf_versions = self.cf(cf::DEPLOYMENT_VERSIONS)?;
        let cf_counters = self.cf(cf::VERSION_COUNTERS)?;

        let deployment_key = keys::deployment_key(&deployment.deployment_id);
        let index_key = keys::app_deployment_key(&deployment.app_id, &deployment.deployment_id);
        let version_key =
            keys::version_key(&deployment.app_id, &deployment.service_name, deployment.version);
        let counter_key = keys::service_key(&deployment.app_id, &deployment.service_name);
        let value = Self::serialize(deployment)?;

        let _guard = self.write_lock.lock();

        if self.exists(cf::DEPLOYMENTS, &deployment_key)? {
            return Err(StoreError::AlreadyExists(format!(
                "deployment {}",
                deployment.deployment_id
            )));
        }
        if self.exists(cf::DEPLOYMENT_VERSIONS, &version_key)? {
            return Err(StoreError::AlreadyExists(format!(
                "version {} of service {}",
                deployment.version, deployment.service_name
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_deployments, &deployment_key, &value);
        batch.put_cf(&cf_by_app, &index_key, []);
        batch.put_cf(&cf_versions, &version_key, &deployment_key);

        // Versions written without going through the allocator still reserve their number.
        if self.read_counter(&counter_key)? < deployment.version {
            batch.put_cf(&cf_counters, &counter_key, deployment.version.to_be_bytes());
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_deployment(&self, deployment_id: &DeploymentId) -> Result<Option<Deployment>> {
        self.get_value(cf::DEPLOYMENTS, &keys::deployment_key(deployment_id))
    }

    fn list_deployments_by_app(&self, app_id: &AppId) -> Result<Vec<Deployment>> {
        let mut deployments = Vec::new();
        for key in self.scan_app_index(cf::DEPLOYMENTS_BY_APP, app_id)? {
            let deployment_id = keys::extract_deployment_id(&key);
            if let Some(deployment) = self.get_deployment(&deployment_id)? {
                deployments.push(deployment);
            }
        }

        deployments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version.cmp(&a.version))
        });
        Ok(deployments)
    }

    fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let cf = self.cf(cf::DEPLOYMENTS)?;
        let key = keys::deployment_key(&deployment.deployment_id);
        let value = Self::serialize(deployment)?;

        let _guard = self.write_lock.lock();
        if !self.exists(cf::DEPLOYMENTS, &key)? {
            return Err(StoreError::NotFound);
        }

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Build Operations
    // =========================================================================

    fn create_build(&self, build: &BuildJob) -> Result<()> {
        let cf_builds = self.cf(cf::BUILDS)?;
        let cf_by_app = self.cf(cf::BUILDS_BY_APP)?;
        let cf_by_deployment = self.cf(cf::BUILDS_BY_DEPLOYMENT)?;

        let build_key = keys::build_key(&build.build_id);
        let index_key = keys::app_build_key(&build.app_id, &build.build_id);
        let deployment_key = keys::deployment_key(&build.deployment_id);
        let value = Self::serialize(build)?;

        let _guard = self.write_lock.lock();
        if self.exists(cf::BUILDS, &build_key)? {
            return Err(StoreError::AlreadyExists(format!("build {}", build.build_id)));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_builds, &build_key, &value);
        batch.put_cf(&cf_by_app, &index_key, []);
        batch.put_cf(&cf_by_deployment, &deployment_key, &build_key);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_build(&self, build_id: &BuildId) -> Result<Option<BuildJob>> {
        self.get_value(cf::BUILDS, &keys::build_key(build_id))
    }

    fn get_build_by_deployment(&self, deployment_id: &DeploymentId) -> Result<Option<BuildJob>> {
        let cf = self.cf(cf::BUILDS_BY_DEPLOYMENT)?;
        let Some(build_key) = self
            .db
            .get_cf(&cf, keys::deployment_key(deployment_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        self.get_value(cf::BUILDS, &build_key)
    }

    fn update_build(&self, build: &BuildJob) -> Result<()> {
        let cf = self.cf(cf::BUILDS)?;
        let key = keys::build_key(&build.build_id);
        let value = Self::serialize(build)?;

        let _guard = self.write_lock.lock();
        if !self.exists(cf::BUILDS, &key)? {
            return Err(StoreError::NotFound);
        }

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_builds_by_app(&self, app_id: &AppId) -> Result<Vec<BuildJob>> {
        let mut builds = Vec::new();
        for key in self.scan_app_index(cf::BUILDS_BY_APP, app_id)? {
            let build_id = keys::extract_build_id(&key);
            if let Some(build) = self.get_build(&build_id)? {
                builds.push(build);
            }
        }

        builds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(builds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BuildStatus, BuildType, DatabaseSpec, DeploymentStatus, RuntimeConfig, ServiceConfig,
        ServiceSource,
    };
    use chrono::{Duration, Utc};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_app(name: &str) -> App {
        let mut db = ServiceConfig::new(
            "db",
            ServiceSource::Database {
                flake_uri: None,
                database: DatabaseSpec {
                    engine: "postgres".to_string(),
                    version: "16".to_string(),
                },
            },
        );
        db.ports.push(crate::types::PortMapping {
            container_port: 5432,
            protocol: None,
        });
        let mut api = ServiceConfig::new(
            "api",
            ServiceSource::Git {
                git_repo: "https://github.com/acme/shop".to_string(),
                git_ref: Some("main".to_string()),
                flake_output: Some("packages.x86_64-linux.api".to_string()),
            },
        );
        api.depends_on = vec!["db".to_string()];

        App {
            app_id: AppId::generate_deterministic(name, 7),
            name: name.to_string(),
            description: None,
            services: vec![db, api],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn create_test_deployment(app_id: &AppId, service: &str, version: u32) -> Deployment {
        Deployment {
            deployment_id: DeploymentId::generate(),
            app_id: *app_id,
            service_name: service.to_string(),
            version,
            git_ref: Some("main".to_string()),
            git_commit: None,
            build_type: BuildType::PureNix,
            artifact: None,
            status: DeploymentStatus::Pending,
            node_id: None,
            config: RuntimeConfig::default(),
            depends_on: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn create_test_build(deployment: &Deployment) -> BuildJob {
        BuildJob {
            build_id: BuildId::generate(),
            deployment_id: deployment.deployment_id,
            app_id: deployment.app_id,
            service_name: deployment.service_name.clone(),
            git_url: Some("https://github.com/acme/shop".to_string()),
            git_ref: deployment.git_ref.clone(),
            flake_output: None,
            build_type: BuildType::PureNix,
            build_strategy: None,
            build_config: None,
            status: BuildStatus::Queued,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn app_roundtrip_preserves_services() {
        let (store, _dir) = create_test_store();
        let app = create_test_app("shop");

        store.put_app(&app).unwrap();

        let retrieved = store.get_app(&app.app_id).unwrap().unwrap();
        assert_eq!(retrieved.name, "shop");
        assert_eq!(retrieved.services, app.services);
        assert_eq!(store.list_apps().unwrap().len(), 1);

        let other = AppId::from_bytes([9u8; 32]);
        assert!(store.get_app(&other).unwrap().is_none());
    }

    #[test]
    fn next_version_starts_at_one_per_service() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);

        assert_eq!(store.next_version(&app_id, "api").unwrap(), 1);
        assert_eq!(store.next_version(&app_id, "api").unwrap(), 2);
        assert_eq!(store.next_version(&app_id, "db").unwrap(), 1);
        assert_eq!(store.next_version(&app_id, "api").unwrap(), 3);

        let other_app = AppId::from_bytes([2u8; 32]);
        assert_eq!(store.next_version(&other_app, "api").unwrap(), 1);
    }

    #[test]
    fn next_version_is_unique_under_concurrency() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);

        let versions: Vec<u32> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..25)
                            .map(|_| store.next_version(&app_id, "api").unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let unique: HashSet<u32> = versions.iter().copied().collect();
        assert_eq!(unique.len(), 200);
        assert_eq!(unique.iter().max(), Some(&200));
    }

    #[test]
    fn create_deployment_rejects_duplicate_version() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);

        let first = create_test_deployment(&app_id, "api", 1);
        store.create_deployment(&first).unwrap();

        let duplicate = create_test_deployment(&app_id, "api", 1);
        let result = store.create_deployment(&duplicate);
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));

        let same_id = first.clone();
        assert!(matches!(
            store.create_deployment(&same_id),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn explicit_versions_reserve_the_counter() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);

        store
            .create_deployment(&create_test_deployment(&app_id, "api", 4))
            .unwrap();
        assert_eq!(store.next_version(&app_id, "api").unwrap(), 5);
    }

    #[test]
    fn deployments_listed_most_recent_first() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);
        let other_app = AppId::from_bytes([2u8; 32]);

        let mut older = create_test_deployment(&app_id, "api", 1);
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = create_test_deployment(&app_id, "api", 2);
        let foreign = create_test_deployment(&other_app, "api", 1);

        store.create_deployment(&older).unwrap();
        store.create_deployment(&newer).unwrap();
        store.create_deployment(&foreign).unwrap();

        let listed = store.list_deployments_by_app(&app_id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].deployment_id, newer.deployment_id);
        assert_eq!(listed[1].deployment_id, older.deployment_id);
    }

    #[test]
    fn update_deployment_requires_existing_record() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);
        let mut deployment = create_test_deployment(&app_id, "api", 1);

        assert!(matches!(
            store.update_deployment(&deployment),
            Err(StoreError::NotFound)
        ));

        store.create_deployment(&deployment).unwrap();
        deployment.status = DeploymentStatus::Building;
        store.update_deployment(&deployment).unwrap();

        let stored = store
            .get_deployment(&deployment.deployment_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DeploymentStatus::Building);
    }

    #[test]
    fn build_crud_and_indexes() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);
        let deployment = create_test_deployment(&app_id, "api", 1);
        store.create_deployment(&deployment).unwrap();

        let mut build = create_test_build(&deployment);
        store.create_build(&build).unwrap();

        let by_deployment = store
            .get_build_by_deployment(&deployment.deployment_id)
            .unwrap()
            .unwrap();
        assert_eq!(by_deployment.build_id, build.build_id);

        build.status = BuildStatus::Running;
        store.update_build(&build).unwrap();
        assert_eq!(
            store.get_build(&build.build_id).unwrap().unwrap().status,
            BuildStatus::Running
        );

        assert_eq!(store.list_builds_by_app(&app_id).unwrap().len(), 1);
        assert!(store
            .list_builds_by_app(&AppId::from_bytes([2u8; 32]))
            .unwrap()
            .is_empty());
        assert!(store
            .get_build_by_deployment(&DeploymentId::generate())
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_build_requires_existing_record() {
        let (store, _dir) = create_test_store();
        let app_id = AppId::from_bytes([1u8; 32]);
        let build = create_test_build(&create_test_deployment(&app_id, "api", 1));

        assert!(matches!(store.update_build(&build), Err(StoreError::NotFound)));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let app_id = AppId::from_bytes([1u8; 32]);
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.next_version(&app_id, "api").unwrap();
            store
                .create_deployment(&create_test_deployment(&app_id, "api", 1))
                .unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.list_deployments_by_app(&app_id).unwrap().len(), 1);
        assert_eq!(store.next_version(&app_id, "api").unwrap(), 2);
    }
}
