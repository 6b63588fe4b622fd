//! The relational conversation store is an external collaborator (§1); this
//! is the in-process stand-in the write-behind cache (§4.5.5) persists to,
//! plus the owner-scoped listing `/agent/conversations` needs. It also
//! tracks per-thread ownership so a caller can never read or delete a
//! thread they do not own.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quillmind_common::Message;
use quillmind_memory::{ConversationStore, MemoryError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

#[derive(Debug, Default)]
struct ThreadEntry {
    owner_id: String,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct ThreadRegistry {
    threads: Mutex<HashMap<String, ThreadEntry>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a thread the first time it is seen, a no-op afterwards.
    pub fn ensure(&self, thread_id: &str, owner_id: &str) {
        let mut threads = self.threads.lock().unwrap();
        threads.entry(thread_id.to_string()).or_insert_with(|| ThreadEntry {
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        });
    }

    /// `Some(true)` if known and owned by `owner_id`, `Some(false)` if owned
    /// by someone else, `None` if the thread does not exist yet.
    pub fn is_owned_by(&self, thread_id: &str, owner_id: &str) -> Option<bool> {
        self.threads.lock().unwrap().get(thread_id).map(|t| t.owner_id == owner_id)
    }

    pub fn list_for_owner(&self, owner_id: &str) -> Vec<ThreadSummary> {
        self.threads
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.owner_id == owner_id)
            .map(|(id, t)| ThreadSummary {
                thread_id: id.clone(),
                owner_id: t.owner_id.clone(),
                created_at: t.created_at,
                message_count: t.messages.len(),
            })
            .collect()
    }

    pub fn delete(&self, thread_id: &str) {
        self.threads.lock().unwrap().remove(thread_id);
    }
}

#[async_trait]
impl ConversationStore for ThreadRegistry {
    async fn load_messages(&self, thread_id: &str) -> Result<Vec<Message>, MemoryError> {
        Ok(self.threads.lock().unwrap().get(thread_id).map(|t| t.messages.clone()).unwrap_or_default())
    }

    async fn save_message(&self, thread_id: &str, message: &Message) -> Result<(), MemoryError> {
        let mut threads = self.threads.lock().unwrap();
        let entry = threads.entry(thread_id.to_string()).or_insert_with(|| ThreadEntry {
            owner_id: String::new(),
            created_at: Utc::now(),
            messages: Vec::new(),
        });
        entry.messages.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::Role;

    #[tokio::test]
    async fn ensure_then_list_shows_the_thread_for_its_owner_only() {
        let reg = ThreadRegistry::new();
        reg.ensure("t1", "u1");
        assert_eq!(reg.list_for_owner("u1").len(), 1);
        assert!(reg.list_for_owner("u2").is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_messages() {
        let reg = ThreadRegistry::new();
        reg.ensure("t1", "u1");
        reg.save_message("t1", &Message::new(Role::User, "hi")).await.unwrap();
        let history = reg.load_messages("t1").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn delete_forgets_ownership() {
        let reg = ThreadRegistry::new();
        reg.ensure("t1", "u1");
        reg.delete("t1");
        assert_eq!(reg.is_owned_by("t1", "u1"), None);
    }
}
