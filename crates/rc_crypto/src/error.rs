use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch — wrong key or tampered data)")]
    AeadDecrypt,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Nonce {nonce} already seen for another message")]
    Replay { nonce: String },

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
