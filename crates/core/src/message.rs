use serde::{Deserialize, Serialize};

/// A single role-tagged entry in an entity's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }
}

/// An inbound event from a chat connection, normalized across transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    pub timestamp_ms: i64,
}

impl InboundMessage {
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn cli(content: &str) -> Self {
        Self::new("cli", "user", "default", content)
    }

    /// Key used for locking and history. One entity per sender per channel.
    pub fn entity_key(&self) -> String {
        format!("{}:{}", self.channel, self.sender_id)
    }
}

/// A delivery operation submitted through the bridge and executed by the
/// dispatch loop that owns the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeliveryOp {
    SendMessage { chat_id: String, content: String },
    DeleteMessage { chat_id: String, message_id: String },
}
