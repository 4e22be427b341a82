//! Failure-injecting collaborators shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keel_core::{AppId, BuildId, DeploymentId};
use keel_store::{App, BuildJob, Deployment, RocksStore, Store, StoreError};
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::error::{ControlError, Result};
use crate::queue::BuildQueue;

/// A `RocksStore` whose writes can be made to fail on demand.
pub struct FaultyStore {
    inner: RocksStore,
    fail_create_build: AtomicBool,
    fail_list_deployments: AtomicBool,
    fail_deployment_for: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn open() -> (Self, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Self {
            inner: RocksStore::open(dir.path()).unwrap(),
            fail_create_build: AtomicBool::new(false),
            fail_list_deployments: AtomicBool::new(false),
            fail_deployment_for: Mutex::new(None),
        };
        (store, dir)
    }

    pub fn fail_create_build(&self, fail: bool) {
        self.fail_create_build.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list_deployments(&self, fail: bool) {
        self.fail_list_deployments.store(fail, Ordering::SeqCst);
    }

    /// Fail `create_deployment` for one service only.
    pub fn fail_deployment_for(&self, service: Option<&str>) {
        *self.fail_deployment_for.lock() = service.map(ToString::to_string);
    }
}

fn injected() -> StoreError {
    StoreError::Database("injected failure".to_string())
}

impl Store for FaultyStore {
    fn put_app(&self, app: &App) -> keel_store::Result<()> {
        self.inner.put_app(app)
    }

    fn get_app(&self, app_id: &AppId) -> keel_store::Result<Option<App>> {
        self.inner.get_app(app_id)
    }

    fn list_apps(&self) -> keel_store::Result<Vec<App>> {
        self.inner.list_apps()
    }

    fn next_version(&self, app_id: &AppId, service_name: &str) -> keel_store::Result<u32> {
        self.inner.next_version(app_id, service_name)
    }

    fn create_deployment(&self, deployment: &Deployment) -> keel_store::Result<()> {
        if self.fail_deployment_for.lock().as_deref() == Some(deployment.service_name.as_str()) {
            return Err(injected());
        }
        self.inner.create_deployment(deployment)
    }

    fn get_deployment(&self, deployment_id: &DeploymentId) -> keel_store::Result<Option<Deployment>> {
        self.inner.get_deployment(deployment_id)
    }

    fn list_deployments_by_app(&self, app_id: &AppId) -> keel_store::Result<Vec<Deployment>> {
        if self.fail_list_deployments.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.list_deployments_by_app(app_id)
    }

    fn update_deployment(&self, deployment: &Deployment) -> keel_store::Result<()> {
        self.inner.update_deployment(deployment)
    }

    fn create_build(&self, build: &BuildJob) -> keel_store::Result<()> {
        if self.fail_create_build.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.create_build(build)
    }

    fn get_build(&self, build_id: &BuildId) -> keel_store::Result<Option<BuildJob>> {
        self.inner.get_build(build_id)
    }

    fn get_build_by_deployment(&self, deployment_id: &DeploymentId) -> keel_store::Result<Option<BuildJob>> {
        self.inner.get_build_by_deployment(deployment_id)
    }

    fn update_build(&self, build: &BuildJob) -> keel_store::Result<()> {
        self.inner.update_build(build)
    }

    fn list_builds_by_app(&self, app_id: &AppId) -> keel_store::Result<Vec<BuildJob>> {
        self.inner.list_builds_by_app(app_id)
    }
}

/// A queue that records what it receives and can be told to reject jobs.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<BuildJob>>,
    fail: AtomicBool,
}

impl RecordingQueue {
    pub fn failing() -> Self {
        let queue = Self::default();
        queue.fail.store(true, Ordering::SeqCst);
        queue
    }

    pub fn jobs(&self) -> Vec<BuildJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl BuildQueue for RecordingQueue {
    async fn enqueue(&self, job: &BuildJob) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::Queue("queue unavailable".to_string()));
        }
        self.jobs.lock().push(job.clone());
        Ok(())
    }
}
