//! Message envelope — what the message backend stores and fans out.
//!
//! The backend sees:
//!   - body        (base64 ciphertext, or plaintext when `encrypted` is false)
//!   - encrypted   (conversations may opt out, and sessions without a key fall back)
//!   - salt / iv   (PBKDF2 salt and GCM IV, base64)
//!   - hmac        (HMAC-SHA256 over `body`, base64; absent on legacy messages)
//!   - nonce       (random hex, checked against the receiver's nonce book)
//!
//! Envelopes are immutable once built.

use chrono::{DateTime, Utc};
use rc_crypto::SealedBody;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub body: String,
    pub encrypted: bool,
    #[serde(rename = "encryption_salt", default)]
    pub salt: Option<String>,
    #[serde(rename = "encryption_iv", default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub hmac: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl EncryptedEnvelope {
    /// Plaintext passthrough, `encrypted: false`.
    pub fn plaintext(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            encrypted: false,
            salt: None,
            iv: None,
            hmac: None,
            nonce: None,
        }
    }

    pub fn sealed(sealed: SealedBody, hmac: Option<String>, nonce: Option<String>) -> Self {
        Self {
            body: sealed.ciphertext,
            encrypted: true,
            salt: Some(sealed.salt),
            iv: Some(sealed.iv),
            hmac,
            nonce,
        }
    }
}

/// One persisted message: routing metadata plus its envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    #[serde(flatten)]
    pub envelope: EncryptedEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_match_backend_schema() {
        let env = EncryptedEnvelope::sealed(
            SealedBody {
                ciphertext: "Y3Q=".into(),
                salt: "c2FsdA==".into(),
                iv: "aXY=".into(),
            },
            Some("dGFn".into()),
            Some("00ff".into()),
        );
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["body"], "Y3Q=");
        assert_eq!(v["encrypted"], true);
        assert_eq!(v["encryption_salt"], "c2FsdA==");
        assert_eq!(v["encryption_iv"], "aXY=");
        assert_eq!(v["hmac"], "dGFn");
        assert_eq!(v["nonce"], "00ff");
    }

    #[test]
    fn legacy_row_without_hmac_or_nonce_parses() {
        let row = r#"{"body":"hello","encrypted":false,"encryption_salt":null,"encryption_iv":null}"#;
        let env: EncryptedEnvelope = serde_json::from_str(row).unwrap();
        assert_eq!(env, EncryptedEnvelope::plaintext("hello"));
    }
}
