//! Decrypted plaintext, keyed by message id, for the lifetime of a session.
//!
//! Unbounded: a session lives as long as the conversation view showing it.
//! Two tasks racing on one id both compute; the first stored value wins and
//! both callers get it back.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct MemoTable {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, message_id: &str) -> Option<String> {
        self.entries.lock().get(message_id).cloned()
    }

    /// Store `text` unless the id already has a value; returns the stored value.
    pub fn insert(&self, message_id: &str, text: String) -> String {
        self.entries
            .lock()
            .entry(message_id.to_string())
            .or_insert(text)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry whose text is `text`, so those ids are decrypted again.
    pub fn forget_text(&self, text: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, v| v != text);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_wins() {
        let memo = MemoTable::new();
        assert_eq!(memo.insert("m1", "hello".into()), "hello");
        assert_eq!(memo.insert("m1", "other".into()), "hello");
        assert_eq!(memo.get("m1").as_deref(), Some("hello"));
        assert_eq!(memo.len(), 1);
        memo.clear();
        assert!(memo.is_empty());
    }

    #[test]
    fn forget_text_drops_only_matching_entries() {
        let memo = MemoTable::new();
        memo.insert("m1", "[unreadable]".into());
        memo.insert("m2", "hello".into());
        memo.insert("m3", "[unreadable]".into());
        assert_eq!(memo.forget_text("[unreadable]"), 2);
        assert_eq!(memo.len(), 1);
        assert_eq!(memo.get("m2").as_deref(), Some("hello"));
    }
}
