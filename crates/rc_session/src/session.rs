//! Per-conversation encryption session.
//!
//! One `EncryptionSession` exists per open conversation view. Its key slot
//! moves through:
//!
//!   Uninitialized ──init()──▶ KeyPending ──key found──▶ Ready
//!
//! There is no error state. Without a key, outbound messages go out as
//! plaintext (`encrypted: false`) and the next send or receive retries the
//! lookup. `dispose()` returns the session to `Uninitialized`.
//!
//! Key lookup order on entering `KeyPending`:
//!   1. local `KeyStore`
//!   2. `Shared` conversations: SHA-256 of the conversation id
//!      `Direct` conversations: the exchange record; the initiator creates and
//!      publishes a random key when none exists yet
//!
//! A cached key is not re-checked against the exchange record on every
//! message. When an inbound envelope fails authentication or decryption, the
//! session reads the record once and, if it holds a newer version (a peer
//! rotated), adopts it and retries. `resync()` does the same on demand.
//!
//! Replay detection covers the lifetime of one session: the nonce book is
//! in memory only and `dispose()` empties it. Each nonce is bound to its
//! conversation and ciphertext as AES-GCM associated data, so a replayed body
//! cannot be given a fresh nonce.

use std::sync::Arc;

use parking_lot::Mutex;
use rc_crypto::{
    aead,
    kdf::{self, DETERMINISTIC_VERSION},
    mac,
    replay::{self, NonceBook},
    CryptoError, KeyMaterial,
};
use rc_proto::{EncryptedEnvelope, PayloadError, ShareablePayload};
use rc_store::KeyStore;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    distributor::KeyDistributor,
    error::SessionError,
    memo::MemoTable,
    settings::{HmacPolicy, SessionSettings},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    /// Every member can derive the key from the conversation id.
    Shared,
    /// One-to-one thread whose key travels through the exchange record.
    Direct { initiator: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    KeyPending,
    Ready,
}

struct KeySlot {
    state: SessionState,
    key: Option<KeyMaterial>,
}

pub struct EncryptionSession {
    conversation_id: String,
    participant_id: String,
    kind: ConversationKind,
    store: Arc<dyn KeyStore>,
    distributor: Arc<KeyDistributor>,
    settings: SessionSettings,
    slot: RwLock<KeySlot>,
    memo: MemoTable,
    nonces: Mutex<NonceBook>,
}

impl EncryptionSession {
    pub fn new(
        conversation_id: impl Into<String>,
        participant_id: impl Into<String>,
        kind: ConversationKind,
        store: Arc<dyn KeyStore>,
        distributor: Arc<KeyDistributor>,
        settings: SessionSettings,
    ) -> Self {
        let nonces = NonceBook::with_capacity(settings.replay_window);
        Self {
            conversation_id: conversation_id.into(),
            participant_id: participant_id.into(),
            kind,
            store,
            distributor,
            settings,
            slot: RwLock::new(KeySlot {
                state: SessionState::Uninitialized,
                key: None,
            }),
            memo: MemoTable::new(),
            nonces: Mutex::new(nonces),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn kind(&self) -> ConversationKind {
        self.kind
    }

    pub async fn state(&self) -> SessionState {
        self.slot.read().await.state
    }

    pub async fn current_key(&self) -> Option<KeyMaterial> {
        self.slot.read().await.key.clone()
    }

    pub fn memo(&self) -> &MemoTable {
        &self.memo
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Look up or provision the conversation key.
    ///
    /// Only a failing RNG is an error; a missing key leaves the session in
    /// `KeyPending`.
    pub async fn init(&self) -> Result<SessionState, SessionError> {
        let mut slot = self.slot.write().await;
        if slot.state == SessionState::Ready {
            return Ok(SessionState::Ready);
        }
        slot.state = SessionState::KeyPending;
        debug!(conversation_id = %self.conversation_id, "resolving conversation key");
        self.resolve(&mut slot).await?;
        Ok(slot.state)
    }

    /// Drop the key, memo table and nonce book. Nonces seen before this call
    /// are no longer recognised as replays.
    pub async fn dispose(&self) {
        let mut slot = self.slot.write().await;
        slot.key = None;
        slot.state = SessionState::Uninitialized;
        self.memo.clear();
        self.nonces.lock().clear();
        info!(conversation_id = %self.conversation_id, "encryption session disposed");
    }

    async fn resolve(&self, slot: &mut KeySlot) -> Result<(), SessionError> {
        let cached = match self.store.load(&self.conversation_id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "key cache unreadable");
                None
            }
        };

        let key = match cached {
            Some(key) if self.settings.enforce_key_expiry && key.is_expired() => {
                Some(self.refresh_expired(key).await)
            }
            Some(key) => {
                debug!(conversation_id = %self.conversation_id, version = key.version(), "using cached key");
                Some(key)
            }
            None => self.provision().await?,
        };

        match key {
            Some(key) => {
                info!(
                    conversation_id = %self.conversation_id,
                    version = key.version(),
                    "conversation key ready"
                );
                slot.key = Some(key);
                slot.state = SessionState::Ready;
            }
            None => {
                info!(conversation_id = %self.conversation_id, "waiting for conversation key");
                slot.state = SessionState::KeyPending;
            }
        }
        Ok(())
    }

    async fn provision(&self) -> Result<Option<KeyMaterial>, SessionError> {
        match self.kind {
            ConversationKind::Shared => {
                let key = kdf::derive_deterministic(&self.conversation_id);
                self.cache(&key).await;
                Ok(Some(key))
            }
            ConversationKind::Direct { initiator } => {
                match self.distributor.fetch(&self.conversation_id).await {
                    Ok(Some(key)) => return Ok(Some(key)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(conversation_id = %self.conversation_id, error = %e, "key fetch failed");
                    }
                }
                if !initiator {
                    return Ok(None);
                }
                let key = kdf::derive_random(&self.conversation_id, 1)?;
                self.cache(&key).await;
                self.publish(&key).await;
                Ok(Some(key))
            }
        }
    }

    /// An expired key is refreshed from the exchange record or, for a
    /// never-rotated shared key, re-derived. Failing both, it stays in use so
    /// existing history remains readable.
    async fn refresh_expired(&self, stale: KeyMaterial) -> KeyMaterial {
        warn!(
            conversation_id = %self.conversation_id,
            version = stale.version(),
            expired_at = %stale.expires_at(),
            "cached key expired; refreshing"
        );

        match self.distributor.fetch_record(&self.conversation_id).await {
            Ok(Some(fresh)) if fresh.version() >= stale.version() => {
                self.cache(&fresh).await;
                return fresh;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "key refresh fetch failed");
            }
        }

        if self.kind == ConversationKind::Shared && stale.version() == DETERMINISTIC_VERSION {
            let fresh = kdf::derive_deterministic(&self.conversation_id);
            if fresh.key_b64() == stale.key_b64() {
                self.cache(&fresh).await;
                return fresh;
            }
        }

        warn!(conversation_id = %self.conversation_id, "no fresh key available; keeping expired key");
        stale
    }

    /// Ready key, retrying resolution when still pending.
    async fn ensure_key(&self) -> Result<Option<KeyMaterial>, SessionError> {
        {
            let slot = self.slot.read().await;
            if slot.state == SessionState::Ready {
                return Ok(slot.key.clone());
            }
        }
        let mut slot = self.slot.write().await;
        if slot.state != SessionState::Ready {
            slot.state = SessionState::KeyPending;
            self.resolve(&mut slot).await?;
        }
        Ok(slot.key.clone())
    }

    async fn cache(&self, key: &KeyMaterial) {
        if let Err(e) = self.store.save(&self.conversation_id, key).await {
            warn!(conversation_id = %self.conversation_id, error = %e, "could not cache key");
        }
    }

    async fn publish(&self, key: &KeyMaterial) {
        if let Err(e) = self.distributor.publish(&self.participant_id, key).await {
            warn!(conversation_id = %self.conversation_id, error = %e, "key publish failed");
        }
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Encrypt and sign an outgoing body. Without a key the body goes out as
    /// plaintext; only an RNG failure is an error.
    pub async fn encrypt_outbound(&self, plaintext: &str) -> Result<EncryptedEnvelope, SessionError> {
        let Some(key) = self.ensure_key().await? else {
            debug!(conversation_id = %self.conversation_id, "no key yet; sending plaintext");
            return Ok(EncryptedEnvelope::plaintext(plaintext));
        };

        let plaintext = plaintext.to_owned();
        let conversation_id = self.conversation_id.clone();
        let envelope = tokio::task::spawn_blocking(move || -> Result<_, CryptoError> {
            let nonce = replay::generate_nonce()?;
            let aad = aead::associated_data(&conversation_id, Some(&nonce));
            let sealed = aead::encrypt(plaintext.as_bytes(), &aad, &key)?;
            let tag = mac::sign(&sealed.ciphertext, &key)?;
            Ok(EncryptedEnvelope::sealed(sealed, Some(tag), Some(nonce)))
        })
        .await??;
        Ok(envelope)
    }

    /// Plaintext for display. Each message id is decrypted at most once;
    /// failures turn into the configured placeholder and are remembered too,
    /// except while the key is still missing.
    pub async fn decrypt_inbound(&self, message_id: &str, envelope: &EncryptedEnvelope) -> String {
        if let Some(hit) = self.memo.get(message_id) {
            return hit;
        }

        match self.open_envelope(message_id, envelope).await {
            Ok(text) => self.memo.insert(message_id, text),
            Err(SessionError::KeyUnavailable(_)) => {
                debug!(message_id, "key not available yet; message left unread");
                self.settings.decrypt_failure_text.clone()
            }
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, message_id, error = %e, "message unreadable");
                self.memo
                    .insert(message_id, self.settings.decrypt_failure_text.clone())
            }
        }
    }

    /// Authenticate and decrypt one envelope, bypassing the memo table.
    ///
    /// On an authentication or decryption failure the exchange record is
    /// consulted once for a newer key before giving up.
    pub async fn open_envelope(
        &self,
        message_id: &str,
        envelope: &EncryptedEnvelope,
    ) -> Result<String, SessionError> {
        if !envelope.encrypted {
            return Ok(envelope.body.clone());
        }
        if envelope.salt.is_none() || envelope.iv.is_none() {
            return Err(SessionError::DecryptionFailed);
        }
        if envelope.nonce.is_none() && self.settings.require_nonce {
            return Err(SessionError::MissingNonce);
        }
        let key = self
            .ensure_key()
            .await?
            .ok_or_else(|| SessionError::KeyUnavailable(self.conversation_id.clone()))?;

        let text = match self.open_with(&key, message_id, envelope).await {
            Err(e @ (SessionError::AuthenticationMismatch | SessionError::DecryptionFailed)) => {
                match self.adopt_newer(Some(key.version())).await {
                    Ok(Some(newer)) => self.open_with(&newer, message_id, envelope).await?,
                    Ok(None) => return Err(e),
                    Err(fetch_err) => {
                        warn!(conversation_id = %self.conversation_id, error = %fetch_err, "key resync failed");
                        return Err(e);
                    }
                }
            }
            other => other?,
        };

        if let Some(nonce) = &envelope.nonce {
            self.nonces
                .lock()
                .check_and_store(nonce, message_id)
                .map_err(|_| SessionError::Replay(nonce.clone()))?;
        }
        Ok(text)
    }

    async fn open_with(
        &self,
        key: &KeyMaterial,
        message_id: &str,
        envelope: &EncryptedEnvelope,
    ) -> Result<String, SessionError> {
        if let Some(tag) = &envelope.hmac {
            if !mac::verify(&envelope.body, tag, key) {
                warn!(conversation_id = %self.conversation_id, message_id, version = key.version(), "HMAC mismatch on inbound envelope");
                if self.settings.hmac_policy == HmacPolicy::Strict {
                    return Err(SessionError::AuthenticationMismatch);
                }
            }
        }

        let (Some(salt), Some(iv)) = (envelope.salt.clone(), envelope.iv.clone()) else {
            return Err(SessionError::DecryptionFailed);
        };
        let aad = aead::associated_data(&self.conversation_id, envelope.nonce.as_deref());
        let body = envelope.body.clone();
        let key = key.clone();
        let plaintext =
            tokio::task::spawn_blocking(move || aead::decrypt(&body, &salt, &iv, &aad, &key))
                .await?
                .map_err(|_| SessionError::DecryptionFailed)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| SessionError::DecryptionFailed)
    }

    // ── Key management ───────────────────────────────────────────────────────

    /// Adopt the published key if it is newer than the one in use.
    ///
    /// Returns the adopted key, or `None` when the record is missing or not
    /// newer. Placeholders remembered for unreadable messages are dropped so
    /// those messages are decrypted again.
    pub async fn resync(&self) -> Result<Option<KeyMaterial>, SessionError> {
        self.adopt_newer(None).await
    }

    /// With `failed_version` set, a key already newer than it (adopted by a
    /// concurrent caller) is returned without another fetch.
    async fn adopt_newer(&self, failed_version: Option<u32>) -> Result<Option<KeyMaterial>, SessionError> {
        let mut slot = self.slot.write().await;
        let current = slot.key.as_ref().map(|k| k.version());
        if let (Some(current), Some(failed)) = (current, failed_version) {
            if current > failed {
                return Ok(slot.key.clone());
            }
        }

        let Some(fresh) = self.distributor.fetch_record(&self.conversation_id).await? else {
            return Ok(None);
        };
        if current.is_some_and(|v| fresh.version() <= v) {
            debug!(
                conversation_id = %self.conversation_id,
                published = fresh.version(),
                "published key is not newer than the cached one"
            );
            return Ok(None);
        }

        self.cache(&fresh).await;
        let reopened = self.memo.forget_text(&self.settings.decrypt_failure_text);
        info!(
            conversation_id = %self.conversation_id,
            version = fresh.version(),
            reopened,
            "adopted newer conversation key"
        );
        slot.key = Some(fresh.clone());
        slot.state = SessionState::Ready;
        Ok(Some(fresh))
    }

    /// Replace the key with fresh random material one version up, cache it,
    /// and publish it. Messages sealed under the old key become unreadable to
    /// anyone holding only the new one.
    pub async fn rotate(&self) -> Result<KeyMaterial, SessionError> {
        let mut slot = self.slot.write().await;
        if slot.state != SessionState::Ready {
            self.resolve(&mut slot).await?;
        }

        let next_version = match slot.key.as_ref() {
            Some(k) => k
                .version()
                .checked_add(1)
                .ok_or(SessionError::VersionExhausted(k.version()))?,
            None => 1,
        };
        let fresh = kdf::derive_random(&self.conversation_id, next_version)?;

        if let Err(e) = self.store.clear(&self.conversation_id).await {
            warn!(conversation_id = %self.conversation_id, error = %e, "could not clear old key");
        }
        self.store.save(&self.conversation_id, &fresh).await?;
        self.publish(&fresh).await;

        info!(conversation_id = %self.conversation_id, version = next_version, "conversation key rotated");
        slot.key = Some(fresh.clone());
        slot.state = SessionState::Ready;
        Ok(fresh)
    }

    /// Out-of-band payload for the current key.
    pub async fn share(&self) -> Result<ShareablePayload, SessionError> {
        let key = self
            .ensure_key()
            .await?
            .ok_or_else(|| SessionError::KeyUnavailable(self.conversation_id.clone()))?;
        Ok(KeyDistributor::generate_payload(&key))
    }

    /// Adopt a key from a scanned or pasted share link. Messages that failed
    /// under the previous key are decrypted again on next display.
    pub async fn import(&self, raw: &str) -> Result<KeyMaterial, SessionError> {
        let payload = KeyDistributor::parse_payload(raw)?;
        if payload.conversation_id != self.conversation_id {
            return Err(PayloadError::WrongConversation {
                expected: self.conversation_id.clone(),
                found: payload.conversation_id,
            }
            .into());
        }

        let mut slot = self.slot.write().await;
        let key = self.distributor.import_payload(&payload).await?;
        self.memo.forget_text(&self.settings.decrypt_failure_text);
        slot.key = Some(key.clone());
        slot.state = SessionState::Ready;
        Ok(key)
    }
}
