//! Identifier types for keel.
//!
//! Apps are addressed by a 32-byte blake3 digest rendered as hex. Deployments
//! and builds are addressed by UUID v4 values, since they are created far more
//! often and carry no meaning beyond uniqueness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte app identifier, generated via blake3 hash.
///
/// App IDs are derived from the app name and a timestamp, so two apps with
/// the same name still receive distinct identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId([u8; 32]);

impl AppId {
    /// Create a new `AppId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a new unique `AppId` from the app name and the current time.
    #[must_use]
    pub fn generate(name: &str) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&timestamp.to_le_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());

        Self(*hasher.finalize().as_bytes())
    }

    /// Generate a deterministic `AppId`, mostly useful in tests.
    #[must_use]
    pub fn generate_deterministic(name: &str, seed: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&seed.to_le_bytes());

        Self(*hasher.finalize().as_bytes())
    }

    /// Parse an `AppId` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 32,
            got: s.len() / 2,
        })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for AppId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppId({})", self.to_hex())
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for AppId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.to_hex()
    }
}

impl AsRef<[u8]> for AppId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Declares a UUID-backed identifier with string serde, parsing and byte access.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Create an identifier from its 16 raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(bytes))
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

uuid_id! {
    /// Identifier of a single deployment attempt.
    DeploymentId
}

uuid_id! {
    /// Identifier of a build job record.
    BuildId
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_hex_roundtrip() {
        let id = AppId::from_bytes([0x42u8; 32]);
        let parsed = AppId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.to_string().parse::<AppId>().unwrap(), id);
    }

    #[test]
    fn app_id_invalid_hex() {
        let result = AppId::from_hex("not-valid-hex");
        assert!(matches!(result, Err(IdError::InvalidHex)));
    }

    #[test]
    fn app_id_wrong_length() {
        let result = AppId::from_hex("deadbeef");
        assert!(matches!(
            result,
            Err(IdError::InvalidLength {
                expected: 32,
                got: 4
            })
        ));
    }

    #[test]
    fn app_id_deterministic() {
        let id1 = AppId::generate_deterministic("shop", 123);
        let id2 = AppId::generate_deterministic("shop", 123);
        assert_eq!(id1, id2);

        let id3 = AppId::generate_deterministic("shop", 456);
        assert_ne!(id1, id3);
    }

    #[test]
    fn app_id_unique_for_same_name() {
        let id1 = AppId::generate("shop");
        let id2 = AppId::generate("shop");
        assert_ne!(id1, id2);
    }

    #[test]
    fn app_id_serializes_as_hex_string() {
        let id = AppId::generate_deterministic("shop", 1);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let parsed: AppId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn deployment_id_parse_and_display() {
        let id = DeploymentId::generate();
        let parsed = DeploymentId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(DeploymentId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn build_id_invalid_uuid() {
        let result = BuildId::from_str("not-a-uuid");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }

    #[test]
    fn build_id_serde_json() {
        let id = BuildId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: BuildId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn uuid_ids_debug_names_type() {
        let uuid = uuid::Uuid::nil();
        assert_eq!(
            format!("{:?}", DeploymentId::from_uuid(uuid)),
            format!("DeploymentId({uuid})")
        );
        assert_eq!(format!("{:?}", BuildId::from_uuid(uuid)), format!("BuildId({uuid})"));
    }
}
