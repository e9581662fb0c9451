//! Persisted conversation log with a hard cap on the number of rounds.
use std::sync::Mutex;

use super::models::{ChatMessage, ChatRole, HistoryLog, now_millis};
use crate::store::Store;

pub const CHAT_HISTORY_KEY: &str = "chat_history";
pub const MAX_CONVERSATION_ROUNDS: usize = 110;

/// Keeps the newest `max_rounds` rounds of `messages`, dropping the
/// oldest first.
///
/// Scans newest to oldest grouping messages into runs of the same role.
/// Every role change closes a run and counts as one round. Once the
/// count reaches `max_rounds` the scan stops, so the run that hit the
/// cap is kept and nothing older is. A partial run left at the oldest
/// end is kept when the cap was not reached. A run is never split.
pub fn trim_to_rounds(messages: Vec<ChatMessage>, max_rounds: usize) -> Vec<ChatMessage> {
    if messages.is_empty() || max_rounds == 0 {
        return Vec::new();
    }

    // Both are newest first
    let mut kept: Vec<Vec<ChatMessage>> = Vec::new();
    let mut current: Vec<ChatMessage> = Vec::new();
    let mut last_role: Option<ChatRole> = None;

    for message in messages.into_iter().rev() {
        let role = message.role;
        if last_role.is_some_and(|last| last != role) {
            kept.push(std::mem::take(&mut current));
            if kept.len() >= max_rounds {
                break;
            }
        }
        current.push(message);
        last_role = Some(role);
    }

    if kept.len() < max_rounds && !current.is_empty() {
        kept.push(current);
    }

    kept.into_iter()
        .rev()
        .flat_map(|run| run.into_iter().rev())
        .collect()
}

/// Owns the persisted conversation log.
///
/// Store failures and corrupt data never escape: reads degrade to an
/// empty log and writes report `false`.
pub struct HistoryManager {
    store: Store,
    max_rounds: usize,
    // Serializes read-modify-write on append
    write_lock: Mutex<()>,
}

impl HistoryManager {
    pub fn new(store: Store) -> Self {
        Self::with_max_rounds(store, MAX_CONVERSATION_ROUNDS)
    }

    pub fn with_max_rounds(store: Store, max_rounds: usize) -> Self {
        Self {
            store,
            max_rounds,
            write_lock: Mutex::new(()),
        }
    }

    pub fn read(&self) -> Vec<ChatMessage> {
        match self.store.get::<HistoryLog>(CHAT_HISTORY_KEY) {
            Ok(Some(log)) => log.messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("Failed to read chat history: {}", e);
                Vec::new()
            }
        }
    }

    /// Overwrites the whole log.
    pub fn save(&self, messages: Vec<ChatMessage>) -> bool {
        let log = HistoryLog {
            messages,
            last_updated: now_millis(),
        };
        match self.store.set(CHAT_HISTORY_KEY, &log) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save chat history: {}", e);
                false
            }
        }
    }

    pub fn append(&self, message: ChatMessage) -> bool {
        let Ok(_guard) = self.write_lock.lock() else {
            tracing::error!("Chat history lock poisoned");
            return false;
        };
        let mut messages = self.read();
        messages.push(message);
        self.save(trim_to_rounds(messages, self.max_rounds))
    }

    pub fn clear(&self) -> bool {
        match self.store.delete(CHAT_HISTORY_KEY) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to clear chat history: {}", e);
                false
            }
        }
    }

    /// The last `count` messages of the log.
    pub fn recent(&self, count: usize) -> Vec<ChatMessage> {
        let messages = self.read();
        let start = messages.len().saturating_sub(count);
        messages[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
            timestamp: 0,
        }
    }

    fn contents(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    fn conversation(rounds: usize) -> Vec<ChatMessage> {
        (0..rounds)
            .flat_map(|i| {
                vec![
                    msg(ChatRole::User, &format!("u{}", i)),
                    msg(ChatRole::Assistant, &format!("a{}", i)),
                ]
            })
            .collect()
    }

    #[test]
    fn test_trim_keeps_newest_runs() {
        let trimmed = trim_to_rounds(conversation(3), 3);
        assert_eq!(contents(&trimmed), vec!["a1", "u2", "a2"]);
    }

    #[test]
    fn test_trim_under_cap_is_untouched() {
        let messages = conversation(2);
        assert_eq!(trim_to_rounds(messages.clone(), 10), messages);
    }

    #[test]
    fn test_trim_never_splits_a_run() {
        let messages = vec![
            msg(ChatRole::User, "u0"),
            msg(ChatRole::Assistant, "a0"),
            msg(ChatRole::User, "u1"),
            msg(ChatRole::User, "u2"),
        ];
        let trimmed = trim_to_rounds(messages, 2);
        assert_eq!(contents(&trimmed), vec!["a0", "u1", "u2"]);
    }

    #[test]
    fn test_trim_keeps_dangling_user_message() {
        let mut messages = conversation(2);
        messages.push(msg(ChatRole::User, "pending"));
        let trimmed = trim_to_rounds(messages, 3);
        assert_eq!(contents(&trimmed), vec!["u1", "a1", "pending"]);
    }

    #[test]
    fn test_trim_is_idempotent() {
        let mut messages = conversation(7);
        messages.push(msg(ChatRole::User, "x"));
        messages.push(msg(ChatRole::User, "y"));
        for cap in [0, 1, 2, 5, 20] {
            let once = trim_to_rounds(messages.clone(), cap);
            let twice = trim_to_rounds(once.clone(), cap);
            assert_eq!(once, twice, "cap {}", cap);
        }
    }

    #[test]
    fn test_trim_empty() {
        assert!(trim_to_rounds(vec![], 5).is_empty());
    }

    #[test]
    fn test_append_and_read() {
        let history = HistoryManager::new(Store::in_memory());
        assert!(history.read().is_empty());
        assert!(history.append(ChatMessage::user("hello")));
        assert!(history.append(ChatMessage::assistant("hi there")));
        assert_eq!(contents(&history.read()), vec!["hello", "hi there"]);
    }

    #[test]
    fn test_append_trims_to_cap() {
        let history = HistoryManager::with_max_rounds(Store::in_memory(), 2);
        for m in conversation(3) {
            assert!(history.append(m));
        }
        assert_eq!(contents(&history.read()), vec!["u2", "a2"]);
    }

    #[test]
    fn test_corrupt_history_reads_as_empty() {
        let store = Store::in_memory();
        store.set_raw(CHAT_HISTORY_KEY, "[[[").unwrap();
        let history = HistoryManager::new(store);
        assert!(history.read().is_empty());

        // Appending recovers the log
        assert!(history.append(ChatMessage::user("fresh")));
        assert_eq!(contents(&history.read()), vec!["fresh"]);
    }

    #[test]
    fn test_clear() {
        let history = HistoryManager::new(Store::in_memory());
        history.append(ChatMessage::user("hello"));
        assert!(history.clear());
        assert!(history.read().is_empty());
        // Clearing an empty log still succeeds
        assert!(history.clear());
    }

    #[test]
    fn test_recent() {
        let history = HistoryManager::new(Store::in_memory());
        history.save(conversation(2));
        assert_eq!(contents(&history.recent(3)), vec!["a0", "u1", "a1"]);
        assert_eq!(history.recent(10).len(), 4);
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn test_failed_append_is_not_recorded() {
        use crate::store::FileBackend;
        use crate::store::file::STORE_FILE_NAME;

        let dir = tempfile::tempdir().unwrap();
        let history = HistoryManager::new(Store::new(FileBackend::open(dir.path()).unwrap()));
        assert!(history.append(ChatMessage::user("saved")));

        let path = dir.path().join(STORE_FILE_NAME);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(!history.append(ChatMessage::user("ghost")));
        assert_eq!(contents(&history.read()), vec!["saved"]);
    }
}
