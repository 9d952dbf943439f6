//! rc_session — Per-conversation encryption for the chat client
//!
//! The chat UI talks to exactly one type: `EncryptionSession`, built when a
//! conversation view opens and disposed when it closes.
//!
//! # Module layout
//! - `session`     — key lifecycle state machine, outbound encrypt, inbound decrypt
//! - `distributor` — exchange-record channel and scannable out-of-band payloads
//! - `memo`        — per-session decrypted plaintext table
//! - `settings`    — HMAC / expiry / replay policies
//! - `paths`       — data directory layout
//! - `error`       — session error taxonomy

pub mod distributor;
pub mod error;
pub mod memo;
pub mod paths;
pub mod session;
pub mod settings;

pub use distributor::{KeyDistributor, ScannableCode};
pub use error::SessionError;
pub use memo::MemoTable;
pub use session::{ConversationKind, EncryptionSession, SessionState};
pub use settings::{HmacPolicy, SessionSettings, Settings};
