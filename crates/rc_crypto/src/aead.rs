//! Message body encryption (AES-256-GCM)
//!
//! Every call draws a fresh 16-byte salt and 12-byte IV. The salt feeds
//! PBKDF2 (see `kdf::message_subkey`) to produce the AES key, so neither the
//! subkey nor the (key, IV) pair is ever reused.
//!
//! All three outputs are base64 (standard alphabet) text.
//!
//! Associated data binds the ciphertext to its conversation and envelope
//! nonce (see `associated_data`). Rewriting or stripping the nonce, or moving
//! the body into another conversation, fails the GCM tag.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

use crate::{error::CryptoError, kdf, key::KeyMaterial};

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;

/// Output of `encrypt`; the inputs `decrypt` needs besides the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBody {
    pub ciphertext: String,
    pub salt: String,
    pub iv: String,
}

/// Associated data for an envelope in `conversation_id` carrying `nonce`.
///
/// Envelopes without a nonce authenticate nothing extra.
pub fn associated_data(conversation_id: &str, nonce: Option<&str>) -> Vec<u8> {
    match nonce {
        Some(nonce) => format!("roomcipher/v1|{conversation_id}|{nonce}").into_bytes(),
        None => Vec::new(),
    }
}

pub fn encrypt(plaintext: &[u8], aad: &[u8], key: &KeyMaterial) -> Result<SealedBody, CryptoError> {
    let salt = kdf::random_bytes::<SALT_LEN>()?;
    let iv = kdf::random_bytes::<IV_LEN>()?;
    let subkey = kdf::message_subkey(key, &salt[..])?;

    let cipher =
        Aes256Gcm::new_from_slice(&subkey[..]).map_err(|_| CryptoError::AeadEncrypt)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv[..]), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    Ok(SealedBody {
        ciphertext: STANDARD.encode(ciphertext),
        salt: STANDARD.encode(&salt[..]),
        iv: STANDARD.encode(&iv[..]),
    })
}

/// Decrypt a sealed body.
///
/// Every failure (bad base64, wrong IV length, tag mismatch) collapses into
/// `AeadDecrypt`. The outcome is terminal for this envelope: retrying with
/// the same inputs cannot succeed.
pub fn decrypt(
    ciphertext: &str,
    salt: &str,
    iv: &str,
    aad: &[u8],
    key: &KeyMaterial,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let ct = STANDARD.decode(ciphertext).map_err(|_| CryptoError::AeadDecrypt)?;
    let salt = STANDARD.decode(salt).map_err(|_| CryptoError::AeadDecrypt)?;
    let iv = STANDARD.decode(iv).map_err(|_| CryptoError::AeadDecrypt)?;
    if iv.len() != IV_LEN || salt.is_empty() {
        return Err(CryptoError::AeadDecrypt);
    }

    let subkey = kdf::message_subkey(key, &salt).map_err(|_| CryptoError::AeadDecrypt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&subkey[..]).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), Payload { msg: ct.as_slice(), aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive_deterministic, derive_random};

    #[test]
    fn roundtrip() {
        let key = derive_deterministic("room-1");
        for msg in ["", "hello", "ünïcødé ✓ message with some length to it"] {
            let sealed = encrypt(msg.as_bytes(), b"", &key).unwrap();
            let pt = decrypt(&sealed.ciphertext, &sealed.salt, &sealed.iv, b"", &key).unwrap();
            assert_eq!(pt.as_slice(), msg.as_bytes());
        }
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let key = derive_deterministic("room-1");
        let a = encrypt(b"same", b"", &key).unwrap();
        let b = encrypt(b"same", b"", &key).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails() {
        let key = derive_deterministic("room-1");
        let other = derive_random("room-1", 2).unwrap();
        let sealed = encrypt(b"secret", b"", &key).unwrap();
        let err = decrypt(&sealed.ciphertext, &sealed.salt, &sealed.iv, b"", &other).unwrap_err();
        assert!(matches!(err, CryptoError::AeadDecrypt));
    }

    #[test]
    fn every_flipped_bit_is_rejected() {
        let key = derive_deterministic("room-1");
        let sealed = encrypt(b"tamper", b"", &key).unwrap();
        let raw = STANDARD.decode(&sealed.ciphertext).unwrap();
        // Sample bits across the body and the tag.
        for bit in (0..raw.len() * 8).step_by(7) {
            let mut tampered = raw.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            let res = decrypt(&STANDARD.encode(&tampered), &sealed.salt, &sealed.iv, b"", &key);
            assert!(res.is_err(), "bit {bit} flip must not decrypt");
        }
    }

    #[test]
    fn malformed_fields_fail_cleanly() {
        let key = derive_deterministic("room-1");
        let sealed = encrypt(b"x", b"", &key).unwrap();
        assert!(decrypt("%%%", &sealed.salt, &sealed.iv, b"", &key).is_err());
        assert!(decrypt(&sealed.ciphertext, &sealed.salt, "AAAA", b"", &key).is_err());
        assert!(decrypt(&sealed.ciphertext, "", &sealed.iv, b"", &key).is_err());
    }

    #[test]
    fn associated_data_is_authenticated() {
        let key = derive_deterministic("room-1");
        let aad = associated_data("room-1", Some("00aa"));
        let sealed = encrypt(b"bound", &aad, &key).unwrap();
        assert_eq!(
            decrypt(&sealed.ciphertext, &sealed.salt, &sealed.iv, &aad, &key)
                .unwrap()
                .as_slice(),
            b"bound"
        );

        for other in [
            associated_data("room-1", Some("00ab")),
            associated_data("room-1", None),
            associated_data("room-2", Some("00aa")),
        ] {
            assert!(decrypt(&sealed.ciphertext, &sealed.salt, &sealed.iv, &other, &key).is_err());
        }
    }
}
