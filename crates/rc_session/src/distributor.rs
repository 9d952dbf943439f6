//! Key distribution between participants and devices.
//!
//! Two independent channels:
//!
//! 1. Exchange record (pull). `publish` upserts the conversation's single
//!    `KeyExchangeRecord`; a joining member calls `fetch` once on entry and
//!    caches what it finds. Nothing is pushed, so a member who joins before
//!    the record exists retries later.
//!
//! 2. Out-of-band payload. `generate_payload` produces a short-lived
//!    `roomcipher://key?data=…` link, `render_code` turns it into a QR code,
//!    and `import_payload` on the receiving device overwrites its cached key.
//!    This is how a second device learns a randomly rotated key.

use std::sync::Arc;

use chrono::Utc;
use qrcode::{
    render::{svg, unicode},
    EcLevel, QrCode,
};
use rc_crypto::KeyMaterial;
use rc_proto::{KeyExchangeRecord, PayloadError, ShareablePayload};
use rc_store::{KeyExchange, KeyStore};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// A share link plus its renderings.
#[derive(Debug, Clone)]
pub struct ScannableCode {
    pub uri: String,
    pub svg: String,
    /// Unicode half-block rendering for terminals.
    pub terminal: String,
}

pub struct KeyDistributor {
    exchange: Arc<dyn KeyExchange>,
    store: Arc<dyn KeyStore>,
}

impl KeyDistributor {
    pub fn new(exchange: Arc<dyn KeyExchange>, store: Arc<dyn KeyStore>) -> Self {
        Self { exchange, store }
    }

    // ── Exchange record channel ──────────────────────────────────────────────

    /// Upsert the exchange record for `key`'s conversation, attributed to
    /// `participant_id`. Overwrites whatever was there.
    pub async fn publish(&self, participant_id: &str, key: &KeyMaterial) -> Result<(), SessionError> {
        let record = KeyExchangeRecord::from_key(key, participant_id);
        self.exchange
            .upsert(&record)
            .await
            .map_err(|e| SessionError::DistributionFailure(e.to_string()))?;
        info!(
            conversation_id = key.conversation_id(),
            version = key.version(),
            "published conversation key"
        );
        Ok(())
    }

    /// Read and decode the exchange record without touching the local cache.
    pub async fn fetch_record(&self, conversation_id: &str) -> Result<Option<KeyMaterial>, SessionError> {
        let record = self
            .exchange
            .get(conversation_id)
            .await
            .map_err(|e| SessionError::DistributionFailure(e.to_string()))?;
        let Some(record) = record else {
            debug!(conversation_id, "no key exchange record yet");
            return Ok(None);
        };
        let key = record
            .decode(Utc::now())
            .map_err(|e| SessionError::DistributionFailure(format!("bad exchange record: {e}")))?;
        Ok(Some(key))
    }

    /// Fetch the published key and cache it locally.
    ///
    /// A failed cache write is logged; the fetched key is still returned.
    pub async fn fetch(&self, conversation_id: &str) -> Result<Option<KeyMaterial>, SessionError> {
        let Some(key) = self.fetch_record(conversation_id).await? else {
            return Ok(None);
        };
        if let Err(e) = self.store.save(conversation_id, &key).await {
            warn!(conversation_id, error = %e, "could not cache fetched key");
        }
        info!(conversation_id, version = key.version(), "fetched conversation key");
        Ok(Some(key))
    }

    // ── Out-of-band channel ──────────────────────────────────────────────────

    pub fn generate_payload(key: &KeyMaterial) -> ShareablePayload {
        ShareablePayload::for_key(key, Utc::now())
    }

    pub fn parse_payload(raw: &str) -> Result<ShareablePayload, PayloadError> {
        ShareablePayload::parse(raw)
    }

    pub fn render_code(payload: &ShareablePayload) -> Result<ScannableCode, SessionError> {
        let uri = payload.to_uri()?;
        let code = QrCode::with_error_correction_level(uri.as_bytes(), EcLevel::M)
            .map_err(|e| SessionError::QrRender(e.to_string()))?;

        let svg = code
            .render::<svg::Color>()
            .min_dimensions(256, 256)
            .build();
        let terminal = code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build();

        Ok(ScannableCode { uri, svg, terminal })
    }

    /// Overwrite the local key for the payload's conversation.
    pub async fn import_payload(&self, payload: &ShareablePayload) -> Result<KeyMaterial, SessionError> {
        let key = payload.to_key_material(Utc::now());
        self.store.save(&payload.conversation_id, &key).await?;
        info!(
            conversation_id = %payload.conversation_id,
            version = payload.version,
            "imported conversation key from share link"
        );
        Ok(key)
    }
}
