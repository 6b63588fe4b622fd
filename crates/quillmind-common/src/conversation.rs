//! Thread / conversation data model (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            created_at: Utc::now(),
        }
    }
}

/// An ordered, append-only message log owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Thread {
    pub thread_id: String,
    pub owner_id: String,
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(thread_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            owner_id: owner_id.into(),
            messages: Vec::new(),
        }
    }
}
