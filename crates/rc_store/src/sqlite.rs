//! SQLite key exchange table via sqlx.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use rc_proto::KeyExchangeRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::debug;

use crate::{error::StoreError, exchange::KeyExchange, migrations};

/// Cheap to clone (the pool is an Arc internally).
#[derive(Clone)]
pub struct SqliteKeyExchange {
    pub pool: SqlitePool,
}

impl SqliteKeyExchange {
    /// Open (or create) the database at `db_path` and run pending migrations.
    ///
    /// WAL mode is set on the connection options, not in a migration: SQLite
    /// refuses to change `journal_mode` inside the transaction sqlx wraps
    /// each migration in.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts).await?;
        migrations::run::run_migrations(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyExchange for SqliteKeyExchange {
    async fn upsert(&self, record: &KeyExchangeRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO key_exchange (conversation_id, shared_by, encrypted_key, key_version, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                shared_by = excluded.shared_by,
                encrypted_key = excluded.encrypted_key,
                key_version = excluded.key_version,
                updated_at = excluded.updated_at",
        )
        .bind(&record.conversation_id)
        .bind(&record.shared_by)
        .bind(&record.encrypted_key)
        .bind(record.key_version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            conversation_id = %record.conversation_id,
            shared_by = %record.shared_by,
            key_version = record.key_version,
            "key exchange record upserted"
        );
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<KeyExchangeRecord>, StoreError> {
        let row: Option<(String, String, String, i64)> = sqlx::query_as(
            "SELECT conversation_id, shared_by, encrypted_key, key_version
             FROM key_exchange WHERE conversation_id = ? LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(conversation_id, shared_by, encrypted_key, key_version)| {
            KeyExchangeRecord {
                conversation_id,
                shared_by,
                encrypted_key,
                key_version,
            }
        }))
    }
}
