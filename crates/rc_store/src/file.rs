//! File-backed key cache: one JSON file per conversation.
//!
//! File names are the hex SHA-256 of the conversation id, so arbitrary ids
//! never reach the filesystem as path components.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rc_crypto::KeyMaterial;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::{
    error::StoreError,
    key_store::{decode_record, CachedKey, KeyStore},
};

#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (creating if needed) a key cache rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn record_path(&self, conversation_id: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(conversation_id.as_bytes()));
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<KeyMaterial>, StoreError> {
        let path = self.record_path(conversation_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let raw = String::from_utf8_lossy(&bytes);
        Ok(decode_record(conversation_id, &raw))
    }

    async fn save(&self, conversation_id: &str, key: &KeyMaterial) -> Result<(), StoreError> {
        let path = self.record_path(conversation_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, CachedKey::to_json(key)?).await?;
        fs::rename(&tmp, &path).await?;
        debug!(conversation_id, version = key.version(), "cached conversation key");
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(conversation_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
