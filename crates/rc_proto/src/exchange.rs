//! Key exchange record — the database-mediated distribution channel.
//!
//! The message backend keeps at most one row per conversation. Any member may
//! overwrite it (last writer wins); the backend only checks membership, so
//! the record is semi-trusted.
//!
//! `encrypted_key` is the base64 key text wrapped in a second base64 layer.
//! This is an encoding, not encryption.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rc_crypto::KeyMaterial;
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeRecord {
    pub conversation_id: String,
    pub shared_by: String,
    pub encrypted_key: String,
    pub key_version: i64,
}

impl KeyExchangeRecord {
    pub fn from_key(key: &KeyMaterial, shared_by: impl Into<String>) -> Self {
        Self {
            conversation_id: key.conversation_id().to_string(),
            shared_by: shared_by.into(),
            encrypted_key: STANDARD.encode(key.key_b64()),
            key_version: i64::from(key.version()),
        }
    }

    /// Unwrap into key material. The fetching device starts a fresh
    /// lifetime at `received_at`.
    pub fn decode(&self, received_at: DateTime<Utc>) -> Result<KeyMaterial, ProtoError> {
        let inner = STANDARD.decode(&self.encrypted_key)?;
        let key_b64 = String::from_utf8(inner).map_err(|_| ProtoError::KeyEncoding)?;
        let version = u32::try_from(self.key_version)
            .ok()
            .filter(|v| *v >= 1)
            .ok_or(ProtoError::InvalidVersion(self.key_version))?;

        let key = KeyMaterial::new(&self.conversation_id, key_b64, version, received_at);
        key.key_bytes()?;
        Ok(key)
    }
}
