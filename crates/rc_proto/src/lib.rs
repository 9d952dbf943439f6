//! rc_proto — Wire and storage types for Roomcipher
//!
//! Everything here is plain serde data; no I/O.
//!
//! # Modules
//! - `envelope` — Encrypted (or opted-out plaintext) message body, as stored per message
//! - `exchange` — Key exchange record kept by the message backend, one per conversation
//! - `share`    — Out-of-band key transfer URI (`roomcipher://key?data=…`)
//! - `error`    — Decoding errors

pub mod envelope;
pub mod error;
pub mod exchange;
pub mod share;

pub use envelope::{EncryptedEnvelope, StoredMessage};
pub use error::ProtoError;
pub use exchange::KeyExchangeRecord;
pub use share::{PayloadError, ShareablePayload, SHARE_SCHEME};
