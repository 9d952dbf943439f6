//! HMAC-SHA256 over the base64 ciphertext text.
//!
//! Independent of the GCM tag: it lets a receiver tell "wrong key / tampered"
//! apart from other decryption failures before running PBKDF2.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{error::CryptoError, key::KeyMaterial};

type HmacSha256 = Hmac<Sha256>;

fn keyed(key: &KeyMaterial) -> Result<HmacSha256, CryptoError> {
    let bytes = key.key_bytes()?;
    HmacSha256::new_from_slice(&bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Base64 tag over `ciphertext`.
pub fn sign(ciphertext: &str, key: &KeyMaterial) -> Result<String, CryptoError> {
    let mut mac = keyed(key)?;
    mac.update(ciphertext.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes().as_slice()))
}

/// Constant-time tag check. Undecodable tags and unusable keys verify false.
pub fn verify(ciphertext: &str, tag: &str, key: &KeyMaterial) -> bool {
    let Ok(expected) = STANDARD.decode(tag) else {
        return false;
    };
    let Ok(mut mac) = keyed(key) else {
        return false;
    };
    mac.update(ciphertext.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aead, kdf::derive_deterministic};

    #[test]
    fn sign_then_verify() {
        let key = derive_deterministic("room-1");
        let sealed = aead::encrypt(b"hi", b"", &key).unwrap();
        let tag = sign(&sealed.ciphertext, &key).unwrap();
        assert!(verify(&sealed.ciphertext, &tag, &key));
    }

    #[test]
    fn flipped_ciphertext_bit_fails_verification() {
        let key = derive_deterministic("room-1");
        let sealed = aead::encrypt(b"integrity", b"", &key).unwrap();
        let tag = sign(&sealed.ciphertext, &key).unwrap();

        let raw = STANDARD.decode(&sealed.ciphertext).unwrap();
        for bit in 0..raw.len() * 8 {
            let mut tampered = raw.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify(&STANDARD.encode(&tampered), &tag, &key), "bit {bit}");
        }
    }

    #[test]
    fn other_key_fails_verification() {
        let key = derive_deterministic("room-1");
        let other = derive_deterministic("room-2");
        let tag = sign("Y2lwaGVydGV4dA==", &key).unwrap();
        assert!(!verify("Y2lwaGVydGV4dA==", &tag, &other));
    }

    #[test]
    fn garbage_tag_is_false_not_error() {
        let key = derive_deterministic("room-1");
        assert!(!verify("abc", "not base64!", &key));
        assert!(!verify("abc", "", &key));
    }
}
