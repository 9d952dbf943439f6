use async_trait::async_trait;
use rc_proto::KeyExchangeRecord;

use crate::error::StoreError;

/// Backend-side distribution table. At most one record per conversation.
#[async_trait]
pub trait KeyExchange: Send + Sync {
    /// Insert or overwrite the record for `record.conversation_id`.
    async fn upsert(&self, record: &KeyExchangeRecord) -> Result<(), StoreError>;

    /// `Ok(None)` when nobody has published a key yet.
    async fn get(&self, conversation_id: &str) -> Result<Option<KeyExchangeRecord>, StoreError>;
}
