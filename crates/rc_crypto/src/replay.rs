//! Replay detection for inbound envelopes.
//!
//! Each envelope carries a random nonce. A session remembers the most recent
//! `capacity` nonces together with the message id they arrived under; the
//! same nonce under a different message id is a replay.

use std::collections::{HashMap, VecDeque};

use crate::{error::CryptoError, kdf};

pub const NONCE_LEN: usize = 16;

/// Fresh hex-encoded envelope nonce.
pub fn generate_nonce() -> Result<String, CryptoError> {
    Ok(hex::encode(&kdf::random_bytes::<NONCE_LEN>()?[..]))
}

#[derive(Debug)]
pub struct NonceBook {
    seen: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl NonceBook {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record `nonce` for `message_id`. Seeing the same pair twice is fine;
    /// the nonce under another message id is rejected.
    pub fn check_and_store(&mut self, nonce: &str, message_id: &str) -> Result<(), CryptoError> {
        if let Some(owner) = self.seen.get(nonce) {
            if owner == message_id {
                return Ok(());
            }
            return Err(CryptoError::Replay { nonce: nonce.to_string() });
        }

        self.seen.insert(nonce.to_string(), message_id.to_string());
        self.order.push_back(nonce.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

impl Default for NonceBook {
    fn default() -> Self {
        Self::with_capacity(4096)
    }
}
