//! rc_store — Persistence for Roomcipher key material
//!
//! # Local key cache (`KeyStore`)
//! One record per conversation per device, JSON:
//!   `{ "key": base64, "createdAt": ms, "expiresAt": ms, "version": n }`
//! A record that fails to parse is reported as absent so the caller
//! regenerates it. Writes overwrite unconditionally (last writer wins).
//!
//! # Key exchange (`KeyExchange`)
//! The message backend's one-row-per-conversation distribution table.
//! `SqliteKeyExchange` is the SQLite rendition; migrations in `migrations/`
//! run on open.

pub mod error;
pub mod exchange;
pub mod file;
pub mod key_store;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use error::StoreError;
pub use exchange::KeyExchange;
pub use file::FileKeyStore;
pub use key_store::{CachedKey, KeyStore};
pub use memory::{MemoryKeyExchange, MemoryKeyStore};
pub use sqlite::SqliteKeyExchange;
