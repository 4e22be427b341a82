//! Key encoding utilities for `RocksDB`.
//!
//! Keys are fixed-width identifier bytes, optionally prefixed with the owning
//! app so that per-app listings are prefix scans. Service names are variable
//! length and are terminated with a zero byte, which DNS-safe names never contain.

use keel_core::{AppId, BuildId, DeploymentId};

/// Encode an app key (just the app ID bytes).
#[must_use]
pub fn app_key(app_id: &AppId) -> Vec<u8> {
    app_id.as_bytes().to_vec()
}

/// Encode an app prefix for scanning an app's deployments or builds.
#[must_use]
pub fn app_prefix(app_id: &AppId) -> Vec<u8> {
    app_id.as_bytes().to_vec()
}

/// Encode a deployment key (just the deployment ID bytes).
#[must_use]
pub fn deployment_key(deployment_id: &DeploymentId) -> Vec<u8> {
    deployment_id.as_bytes().to_vec()
}

/// Encode an app-deployment index key: `app_id || deployment_id`.
#[must_use]
pub fn app_deployment_key(app_id: &AppId, deployment_id: &DeploymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(48);
    key.extend_from_slice(app_id.as_bytes());
    key.extend_from_slice(deployment_id.as_bytes());
    key
}

/// Extract the deployment ID from an app-deployment key.
///
/// # Panics
///
/// Panics if the key is not at least 48 bytes.
#[must_use]
pub fn extract_deployment_id(key: &[u8]) -> DeploymentId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[32..48]);
    DeploymentId::from_bytes(bytes)
}

/// Encode a per-service key: `app_id || service || 0x00`.
///
/// Used both as the version counter key and as the prefix of version keys.
#[must_use]
pub fn service_key(app_id: &AppId, service: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(33 + service.len());
    key.extend_from_slice(app_id.as_bytes());
    key.extend_from_slice(service.as_bytes());
    key.push(0);
    key
}

/// Encode a version uniqueness key: `app_id || service || 0x00 || version`.
///
/// The version is big-endian so keys for one service sort by version.
#[must_use]
pub fn version_key(app_id: &AppId, service: &str, version: u32) -> Vec<u8> {
    let mut key = service_key(app_id, service);
    key.extend_from_slice(&version.to_be_bytes());
    key
}

/// Encode a build key (just the build ID bytes).
#[must_use]
pub fn build_key(build_id: &BuildId) -> Vec<u8> {
    build_id.as_bytes().to_vec()
}

/// Encode an app-build index key: `app_id || build_id`.
#[must_use]
pub fn app_build_key(app_id: &AppId, build_id: &BuildId) -> Vec<u8> {
    let mut key = Vec::with_capacity(48);
    key.extend_from_slice(app_id.as_bytes());
    key.extend_from_slice(build_id.as_bytes());
    key
}

/// Extract the build ID from an app-build key.
///
/// # Panics
///
/// Panics if the key is not at least 48 bytes.
#[must_use]
pub fn extract_build_id(key: &[u8]) -> BuildId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[32..48]);
    BuildId::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_deployment_key_roundtrip() {
        let app_id = AppId::from_bytes([1u8; 32]);
        let deployment_id = DeploymentId::generate();

        let key = app_deployment_key(&app_id, &deployment_id);
        assert_eq!(key.len(), 48);
        assert!(key.starts_with(&app_prefix(&app_id)));
        assert_eq!(extract_deployment_id(&key), deployment_id);
    }

    #[test]
    fn app_build_key_roundtrip() {
        let app_id = AppId::from_bytes([1u8; 32]);
        let build_id = BuildId::generate();

        let key = app_build_key(&app_id, &build_id);
        assert_eq!(extract_build_id(&key), build_id);
    }

    #[test]
    fn service_names_do_not_share_prefixes() {
        let app_id = AppId::from_bytes([1u8; 32]);
        let api = version_key(&app_id, "api", 1);
        let api_worker = version_key(&app_id, "api-worker", 1);

        assert!(api.starts_with(&service_key(&app_id, "api")));
        assert!(!api_worker.starts_with(&service_key(&app_id, "api")));
    }

    #[test]
    fn version_keys_sort_by_version() {
        let app_id = AppId::from_bytes([1u8; 32]);
        let v2 = version_key(&app_id, "api", 2);
        let v10 = version_key(&app_id, "api", 10);
        assert!(v2 < v10);
    }
}
