//! Out-of-band key transfer payload.
//!
//! Moves a conversation key between a user's own devices as a scannable
//! string, which is the only way a second device learns a randomly rotated
//! key without going through the exchange record.
//!
//! Format:
//!   roomcipher://key?data=<base64url(JSON)>
//!
//! JSON body (timestamps are epoch milliseconds):
//!   { "roomId", "key", "version", "expiresAt", "sharedAt" }
//!
//! A payload is valid for 24 hours after `sharedAt`.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rc_crypto::{key::KEY_LEN, KeyMaterial};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scheme + path prefix every payload string must start with.
pub const SHARE_SCHEME: &str = "roomcipher://key?data=";

pub const PAYLOAD_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("not a roomcipher key link")]
    WrongScheme,
    #[error("payload data is not valid base64")]
    BadEncoding,
    #[error("payload body is malformed: {0}")]
    BadBody(String),
    #[error("payload has no conversation id")]
    MissingConversation,
    #[error("payload key is not a 32-byte base64 key")]
    BadKey,
    #[error("payload key version must be at least 1")]
    BadVersion,
    #[error("payload timestamps are out of range")]
    BadTimestamp,
    #[error("payload expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("payload could not be encoded: {0}")]
    Encode(String),
    #[error("payload is for conversation {found}, expected {expected}")]
    WrongConversation { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareablePayload {
    pub conversation_id: String,
    pub key: String,
    pub version: u32,
    pub expires_at: DateTime<Utc>,
    pub shared_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PayloadBody {
    room_id: String,
    key: String,
    version: u32,
    expires_at: i64,
    shared_at: i64,
}

impl ShareablePayload {
    /// Payload for `key`, shared at `now`.
    pub fn for_key(key: &KeyMaterial, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: key.conversation_id().to_string(),
            key: key.key_b64().to_string(),
            version: key.version(),
            expires_at: now + Duration::hours(PAYLOAD_LIFETIME_HOURS),
            shared_at: now,
        }
    }

    pub fn to_uri(&self) -> Result<String, PayloadError> {
        let body = PayloadBody {
            room_id: self.conversation_id.clone(),
            key: self.key.clone(),
            version: self.version,
            expires_at: self.expires_at.timestamp_millis(),
            shared_at: self.shared_at.timestamp_millis(),
        };
        let json = serde_json::to_vec(&body).map_err(|e| PayloadError::Encode(e.to_string()))?;
        Ok(format!("{SHARE_SCHEME}{}", URL_SAFE_NO_PAD.encode(json)))
    }

    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        Self::parse_at(raw, Utc::now())
    }

    /// Parse and validate a scanned or pasted string as of `now`.
    ///
    /// The scheme is checked before anything is decoded.
    pub fn parse_at(raw: &str, now: DateTime<Utc>) -> Result<Self, PayloadError> {
        let data = raw
            .trim()
            .strip_prefix(SHARE_SCHEME)
            .ok_or(PayloadError::WrongScheme)?;
        let json = URL_SAFE_NO_PAD
            .decode(data)
            .map_err(|_| PayloadError::BadEncoding)?;
        let body: PayloadBody =
            serde_json::from_slice(&json).map_err(|e| PayloadError::BadBody(e.to_string()))?;

        if body.room_id.trim().is_empty() {
            return Err(PayloadError::MissingConversation);
        }
        match STANDARD.decode(&body.key) {
            Ok(bytes) if bytes.len() == KEY_LEN => {}
            _ => return Err(PayloadError::BadKey),
        }
        if body.version == 0 {
            return Err(PayloadError::BadVersion);
        }
        let expires_at = millis(body.expires_at)?;
        let shared_at = millis(body.shared_at)?;
        if expires_at <= now {
            return Err(PayloadError::Expired(expires_at));
        }

        Ok(Self {
            conversation_id: body.room_id,
            key: body.key,
            version: body.version,
            expires_at,
            shared_at,
        })
    }

    /// Key material for the importing device; lifetime restarts at `now`.
    pub fn to_key_material(&self, now: DateTime<Utc>) -> KeyMaterial {
        KeyMaterial::new(&self.conversation_id, self.key.clone(), self.version, now)
    }
}

fn millis(ms: i64) -> Result<DateTime<Utc>, PayloadError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(PayloadError::BadTimestamp)
}
