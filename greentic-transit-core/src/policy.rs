//! Named key policies as seen by the cache.
//!
//! The cache only needs [`KeyPolicy::encode`] and [`KeyPolicy::decode`]; the
//! remaining fields belong to the cryptographic operations built on top.

use crate::errors::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Validates that a policy name can be used as a storage key suffix.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidRequest("policy name must not be empty".into()));
    }
    if name.contains('/') {
        return Err(Error::InvalidRequest(format!(
            "policy name contains invalid characters: {name}"
        )));
    }
    Ok(())
}

/// One entry in a policy's key-version chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyVersion {
    /// Creation time in unix seconds.
    pub created_at: u64,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub material: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPolicy {
    pub name: String,
    pub key_type: String,
    pub latest_version: u32,
    pub min_decryption_version: u32,
    #[serde(default)]
    pub deletion_allowed: bool,
    #[serde(default)]
    pub exportable: bool,
    #[serde(default)]
    pub keys: BTreeMap<u32, KeyVersion>,
}

impl KeyPolicy {
    /// A fresh policy with an empty version chain.
    pub fn new(name: impl Into<String>, key_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_type: key_type.into(),
            latest_version: 0,
            min_decryption_version: 1,
            deletion_allowed: false,
            exportable: false,
            keys: BTreeMap::new(),
        }
    }

    /// Append a new key version and make it the latest.
    pub fn push_version(&mut self, created_at: u64, material: Vec<u8>) -> u32 {
        self.latest_version += 1;
        self.keys.insert(
            self.latest_version,
            KeyVersion {
                created_at,
                material,
            },
        );
        self.latest_version
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Encode {
            name: self.name.clone(),
            reason: err.to_string(),
        })
    }

    /// Decode a stored record. `name` is the policy the record was read for and
    /// must match the embedded name.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        let policy: KeyPolicy = serde_json::from_slice(bytes).map_err(|err| Error::Decode {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        if policy.name != name {
            return Err(Error::Decode {
                name: name.to_string(),
                reason: format!("record belongs to policy {}", policy.name),
            });
        }
        Ok(policy)
    }
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}
