//! Key derivation
//!
//! `derive_deterministic` — SHA-256 of the conversation id. Every participant
//!   computes the same key with no exchange step. Always version 1.
//!
//! `derive_random` — 32 bytes from the OS RNG, used for rotation and for
//!   direct conversations where determinism would leak the key.
//!
//! `message_subkey` — PBKDF2-HMAC-SHA256, stretches the conversation key with a
//!   per-message salt into the AES-256-GCM key.

use chrono::Utc;
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    key::{KeyMaterial, KEY_LEN},
};

/// PBKDF2 iteration count for message subkeys.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Version assigned to every deterministically derived key.
pub const DETERMINISTIC_VERSION: u32 = 1;

pub fn derive_deterministic(conversation_id: &str) -> KeyMaterial {
    let digest = Sha256::digest(conversation_id.as_bytes());
    KeyMaterial::from_bytes(conversation_id, &digest, DETERMINISTIC_VERSION, Utc::now())
}

/// Fresh random key for `conversation_id` at `version`.
///
/// RNG failure is surfaced, never papered over with a weaker key.
pub fn derive_random(conversation_id: &str, version: u32) -> Result<KeyMaterial, CryptoError> {
    let bytes = random_bytes::<KEY_LEN>()?;
    Ok(KeyMaterial::from_bytes(conversation_id, &bytes[..], version, Utc::now()))
}

/// Derive the per-message AES key from the conversation key and `salt`.
pub fn message_subkey(
    key: &KeyMaterial,
    salt: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let password = key.key_bytes()?;
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(&password, salt, PBKDF2_ITERATIONS, &mut out[..]);
    Ok(out)
}

pub(crate) fn random_bytes<const N: usize>() -> Result<Zeroizing<[u8; N]>, CryptoError> {
    let mut out = Zeroizing::new([0u8; N]);
    OsRng
        .try_fill_bytes(&mut out[..])
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_key_is_stable() {
        let a = derive_deterministic("room-42");
        let b = derive_deterministic("room-42");
        assert_eq!(a.key_b64(), b.key_b64());
        assert_eq!(a.version(), 1);
        assert_eq!(a.key_bytes().unwrap().len(), KEY_LEN);
    }

    #[test]
    fn deterministic_keys_differ_per_conversation() {
        let ids: Vec<String> = (0..64).map(|i| format!("room-{i}")).collect();
        let mut keys: Vec<String> = ids
            .iter()
            .map(|id| derive_deterministic(id).key_b64().to_string())
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn random_keys_are_unique() {
        let a = derive_random("dm-1", 2).unwrap();
        let b = derive_random("dm-1", 2).unwrap();
        assert_ne!(a.key_b64(), b.key_b64());
        assert_eq!(a.version(), 2);
    }

    #[test]
    fn subkey_depends_on_salt() {
        let key = derive_deterministic("room-7");
        let k1 = message_subkey(&key, b"salt-one-16bytes").unwrap();
        let k2 = message_subkey(&key, b"salt-two-16bytes").unwrap();
        let k1_again = message_subkey(&key, b"salt-one-16bytes").unwrap();
        assert_ne!(*k1, *k2);
        assert_eq!(*k1, *k1_again);
    }
}
