//! In-memory backends (tests, ephemeral sessions).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rc_crypto::KeyMaterial;
use rc_proto::KeyExchangeRecord;

use crate::{
    error::StoreError,
    exchange::KeyExchange,
    key_store::{decode_record, CachedKey, KeyStore},
};

/// Keeps the serialised JSON, so it behaves like the file store on reads.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary raw record, e.g. a corrupted one.
    pub fn put_raw(&self, conversation_id: &str, raw: impl Into<String>) {
        self.records.write().insert(conversation_id.to_string(), raw.into());
    }

    pub fn raw(&self, conversation_id: &str) -> Option<String> {
        self.records.read().get(conversation_id).cloned()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<KeyMaterial>, StoreError> {
        let raw = self.records.read().get(conversation_id).cloned();
        Ok(raw.and_then(|raw| decode_record(conversation_id, &raw)))
    }

    async fn save(&self, conversation_id: &str, key: &KeyMaterial) -> Result<(), StoreError> {
        let raw = CachedKey::to_json(key)?;
        self.records.write().insert(conversation_id.to_string(), raw);
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.records.write().remove(conversation_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyExchange {
    records: RwLock<HashMap<String, KeyExchangeRecord>>,
}

impl MemoryKeyExchange {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyExchange for MemoryKeyExchange {
    async fn upsert(&self, record: &KeyExchangeRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(record.conversation_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<KeyExchangeRecord>, StoreError> {
        Ok(self.records.read().get(conversation_id).cloned())
    }
}
