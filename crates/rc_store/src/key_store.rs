//! Local per-device key cache.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rc_crypto::KeyMaterial;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The cached key, or `None` when missing or unreadable.
    async fn load(&self, conversation_id: &str) -> Result<Option<KeyMaterial>, StoreError>;

    /// Overwrite whatever is cached for `conversation_id`.
    async fn save(&self, conversation_id: &str, key: &KeyMaterial) -> Result<(), StoreError>;

    /// Remove the cached key. Clearing a missing record is not an error.
    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError>;
}

/// On-disk shape of a cached key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedKey {
    pub key: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub version: u32,
}

impl CachedKey {
    pub fn from_key(key: &KeyMaterial) -> Self {
        Self {
            key: key.key_b64().to_string(),
            created_at: key.created_at().timestamp_millis(),
            expires_at: key.expires_at().timestamp_millis(),
            version: key.version(),
        }
    }

    pub fn to_json(key: &KeyMaterial) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&Self::from_key(key))?)
    }

    fn into_key(self, conversation_id: &str) -> Option<KeyMaterial> {
        let created_at = millis(self.created_at)?;
        let expires_at = millis(self.expires_at)?;
        if self.version == 0 {
            return None;
        }
        let key =
            KeyMaterial::from_parts(conversation_id, self.key, self.version, created_at, expires_at);
        key.key_bytes().ok()?;
        Some(key)
    }
}

/// Parse a cached record. Anything unusable (truncated JSON, wrong types,
/// undecodable key) is logged and treated as absent.
pub fn decode_record(conversation_id: &str, raw: &str) -> Option<KeyMaterial> {
    let parsed = serde_json::from_str::<CachedKey>(raw)
        .ok()
        .and_then(|rec| rec.into_key(conversation_id));
    if parsed.is_none() {
        warn!(conversation_id, "discarding malformed cached key record");
    }
    parsed
}

fn millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
