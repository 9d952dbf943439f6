//! Conversation key material.
//!
//! Exactly one `KeyMaterial` is current per conversation per device. Older
//! versions are dropped on rotation; there is no key history.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Lifetime of a conversation key, counted from creation.
pub const KEY_LIFETIME_DAYS: i64 = 30;

/// Raw key length in bytes (AES-256 / SHA-256 digest size).
pub const KEY_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    conversation_id: String,
    /// Base64 (standard alphabet) key bytes.
    key: String,
    #[zeroize(skip)]
    version: u32,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl KeyMaterial {
    /// Build key material created at `created_at`; expiry is fixed at
    /// `KEY_LIFETIME_DAYS` later.
    pub fn new(
        conversation_id: impl Into<String>,
        key_b64: impl Into<String>,
        version: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            key: key_b64.into(),
            version,
            created_at,
            expires_at: created_at + Duration::days(KEY_LIFETIME_DAYS),
        }
    }

    /// Rebuild key material from a persisted record, keeping its stored expiry.
    pub fn from_parts(
        conversation_id: impl Into<String>,
        key_b64: impl Into<String>,
        version: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            key: key_b64.into(),
            version,
            created_at,
            expires_at,
        }
    }

    /// Wrap raw bytes, base64-encoding them.
    pub fn from_bytes(
        conversation_id: impl Into<String>,
        bytes: &[u8],
        version: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(conversation_id, STANDARD.encode(bytes), version, created_at)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn key_b64(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Decode the key bytes. Fails if the stored text is not base64 or not
    /// `KEY_LEN` bytes long.
    pub fn key_bytes(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let bytes = Zeroizing::new(STANDARD.decode(&self.key)?);
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LEN} key bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

// Never print the key itself.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("conversation_id", &self.conversation_id)
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
