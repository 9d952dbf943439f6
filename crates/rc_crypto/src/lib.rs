//! rc_crypto — Roomcipher conversation cryptography
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Key material crosses every public boundary as base64 text.
//! - Secret bytes are zeroized on drop.
//!
//! # Module layout
//! - `key`     — `KeyMaterial`, the one current key of a conversation
//! - `kdf`     — deterministic / random conversation keys, PBKDF2 message subkeys
//! - `aead`    — AES-256-GCM message body encryption (the cipher engine)
//! - `mac`     — HMAC-SHA256 over ciphertext (the message authenticator)
//! - `replay`  — bounded seen-nonce book for inbound envelopes
//! - `error`   — unified error type

pub mod aead;
pub mod error;
pub mod kdf;
pub mod key;
pub mod mac;
pub mod replay;

pub use aead::SealedBody;
pub use error::CryptoError;
pub use key::KeyMaterial;
pub use replay::NonceBook;
