use rc_crypto::CryptoError;
use rc_proto::PayloadError;
use rc_store::StoreError;
use thiserror::Error;

/// Nothing here aborts a send or receive: callers degrade to plaintext
/// (`KeyUnavailable`) or a placeholder (`DecryptionFailed` and friends).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No key available yet for conversation {0}")]
    KeyUnavailable(String),

    #[error("Message could not be decrypted")]
    DecryptionFailed,

    #[error("HMAC verification failed")]
    AuthenticationMismatch,

    #[error("Envelope nonce {0} was already used by another message")]
    Replay(String),

    #[error("Encrypted envelope carries no nonce")]
    MissingNonce,

    #[error("Invalid key link: {0}")]
    MalformedPayload(#[from] PayloadError),

    #[error("Key version {0} cannot be rotated further")]
    VersionExhausted(u32),

    #[error("Key distribution failed: {0}")]
    DistributionFailure(String),

    #[error("Could not render scannable code: {0}")]
    QrRender(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
