use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Wrapped key is not valid UTF-8")]
    KeyEncoding,

    #[error("Invalid key version {0}")]
    InvalidVersion(i64),

    #[error("Crypto error: {0}")]
    Crypto(#[from] rc_crypto::CryptoError),
}
