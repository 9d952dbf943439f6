use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// What to do when an envelope's HMAC does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HmacPolicy {
    /// Reject the envelope. Envelopes with no HMAC at all are still opened.
    Strict,
    /// Log a warning and attempt decryption anyway.
    Advisory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub hmac_policy: HmacPolicy,
    /// Treat an expired cached key as a refresh trigger.
    pub enforce_key_expiry: bool,
    /// Nonces remembered per session for replay detection.
    pub replay_window: usize,
    /// Reject sealed envelopes that carry no nonce. Turn off only to read
    /// history written before envelopes carried one.
    pub require_nonce: bool,
    /// Shown in place of a message that cannot be decrypted.
    pub decrypt_failure_text: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            hmac_policy: HmacPolicy::Strict,
            enforce_key_expiry: true,
            replay_window: 4096,
            require_nonce: true,
            decrypt_failure_text: "[Unable to decrypt message]".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionSettings,
}

impl Settings {
    /// Read settings JSON; a missing file means defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse settings {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("read settings {}", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("write settings {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.session.hmac_policy, HmacPolicy::Strict);
        assert!(settings.session.enforce_key_expiry);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session":{"hmac_policy":"advisory"}}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.session.hmac_policy, HmacPolicy::Advisory);
        assert_eq!(settings.session.replay_window, 4096);
        assert!(settings.session.require_nonce);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.session.enforce_key_expiry = false;
        settings.save(&path).unwrap();
        assert!(!Settings::load(&path).unwrap().session.enforce_key_expiry);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{nope").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
