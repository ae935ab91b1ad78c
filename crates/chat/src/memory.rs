use agentry_core::{ChatMessage, Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

struct MemoryInner {
    cache: HashMap<String, Vec<ChatMessage>>,
    locks: HashMap<String, bool>,
}

/// Per-entity conversation store: a bounded, system-preserving message log
/// plus the entity lock table that serializes in-flight task instances.
///
/// One mutex guards the whole table. Overlapping writers for a single entity
/// are excluded by the caller's lock-check policy, so the mutex only has to
/// protect against cross-entity races.
pub struct ChatMemory {
    limit: Option<usize>,
    inner: Mutex<MemoryInner>,
}

impl ChatMemory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            inner: Mutex::new(MemoryInner {
                cache: HashMap::new(),
                locks: HashMap::new(),
            }),
        }
    }

    pub fn lock(&self, entity_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.locks.insert(entity_id.to_string(), true);
    }

    pub fn unlock(&self, entity_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.locks.insert(entity_id.to_string(), false);
    }

    /// Entities never seen before report unlocked.
    pub fn is_locked(&self, entity_id: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.locks.get(entity_id).copied().unwrap_or(false)
    }

    pub fn push_system(&self, entity_id: &str, content: &str) -> Result<()> {
        self.push(entity_id, ChatMessage::system(content))
    }

    pub fn push_user(&self, entity_id: &str, content: &str) -> Result<()> {
        self.push(entity_id, ChatMessage::user(content))
    }

    pub fn push_assistant(&self, entity_id: &str, content: &str) -> Result<()> {
        self.push(entity_id, ChatMessage::assistant(content))
    }

    /// Append a message to the entity's log, then trim to the configured cap.
    pub fn push(&self, entity_id: &str, message: ChatMessage) -> Result<()> {
        if message.role.is_empty() || message.content.is_empty() {
            return Err(Error::Validation(
                "chat message requires a role and content".to_string(),
            ));
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let messages = inner.cache.entry(entity_id.to_string()).or_default();
        messages.push(message);
        if let Some(limit) = self.limit {
            trim(messages, limit);
        }
        Ok(())
    }

    /// Snapshot of the entity's log. `None` distinguishes a never-initialized
    /// entity from one with an empty log.
    pub fn get(&self, entity_id: &str) -> Option<Vec<ChatMessage>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cache.get(entity_id).cloned()
    }

    /// Replace the entity's log wholesale.
    pub fn set(&self, entity_id: &str, messages: Vec<ChatMessage>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cache.insert(entity_id.to_string(), messages);
    }
}

/// Drop the oldest non-system messages once the log exceeds `limit`.
///
/// The leading run of system messages is kept in place, clamped to `limit - 1`
/// entries so at least one non-system message always survives; the rest of
/// the retained log is the newest tail. A limit of 0 disables trimming.
fn trim(messages: &mut Vec<ChatMessage>, limit: usize) {
    if limit == 0 || messages.len() <= limit {
        return;
    }
    let run = messages.iter().take_while(|m| m.is_system()).count();
    let prefix = run.min(limit.saturating_sub(1));
    let tail = limit - prefix;

    let tail_start = messages.len() - tail;
    messages.drain(prefix..tail_start);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(memory: &ChatMemory, entity: &str) -> Vec<String> {
        memory
            .get(entity)
            .unwrap()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    #[test]
    fn test_lock_round_trip_is_isolated_per_entity() {
        let memory = ChatMemory::new(None);
        assert!(!memory.is_locked("a"));

        memory.lock("a");
        memory.lock("b");
        memory.unlock("b");
        assert!(memory.is_locked("a"));
        assert!(!memory.is_locked("b"));

        memory.unlock("a");
        assert!(!memory.is_locked("a"));
    }

    #[test]
    fn test_get_distinguishes_uninitialized_from_empty() {
        let memory = ChatMemory::new(None);
        assert!(memory.get("ghost").is_none());
        memory.set("seen", Vec::new());
        assert_eq!(memory.get("seen"), Some(Vec::new()));
    }

    #[test]
    fn test_push_requires_role_and_content() {
        let memory = ChatMemory::new(None);
        let err = memory
            .push(
                "e",
                ChatMessage {
                    role: "user".to_string(),
                    content: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_cap_keeps_system_and_newest_tail() {
        let memory = ChatMemory::new(Some(3));
        memory.push_system("e", "system").unwrap();
        memory.push_user("e", "u1").unwrap();
        memory.push_user("e", "u2").unwrap();
        memory.push_user("e", "u3").unwrap();
        assert_eq!(contents(&memory, "e"), vec!["system", "u2", "u3"]);
    }

    #[test]
    fn test_cap_without_system_keeps_newest_only() {
        let memory = ChatMemory::new(Some(3));
        for content in ["u1", "u2", "u3", "u4"] {
            memory.push_user("e", content).unwrap();
        }
        assert_eq!(contents(&memory, "e"), vec!["u2", "u3", "u4"]);
    }

    #[test]
    fn test_length_never_exceeds_cap() {
        let memory = ChatMemory::new(Some(4));
        memory.push_system("e", "system").unwrap();
        for i in 0..20 {
            memory.push_user("e", &format!("m{i}")).unwrap();
            assert!(memory.get("e").unwrap().len() <= 4);
        }
        assert_eq!(memory.get("e").unwrap()[0].role, "system");
    }

    // Long leading system runs clamp to cap - 1 entries, reserving room for
    // exactly one non-system message.
    #[test]
    fn test_long_system_run_clamped() {
        let memory = ChatMemory::new(Some(3));
        for content in ["s1", "s2", "s3", "s4"] {
            memory.push_system("e", content).unwrap();
        }
        assert_eq!(contents(&memory, "e"), vec!["s1", "s2", "s4"]);

        memory.push_user("e", "hello").unwrap();
        assert_eq!(contents(&memory, "e"), vec!["s1", "s2", "hello"]);
    }

    #[test]
    fn test_limit_zero_disables_trimming() {
        let memory = ChatMemory::new(Some(0));
        for i in 0..10 {
            memory.push_user("e", &format!("m{i}")).unwrap();
        }
        assert_eq!(memory.get("e").unwrap().len(), 10);
    }

    #[test]
    fn test_cap_one_keeps_only_newest() {
        let memory = ChatMemory::new(Some(1));
        memory.push_system("e", "system").unwrap();
        memory.push_user("e", "u1").unwrap();
        assert_eq!(contents(&memory, "e"), vec!["u1"]);
    }
}
