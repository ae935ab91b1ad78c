use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Settings for the chat session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Maximum number of messages kept per entity. None disables trimming.
    #[serde(default = "default_history_limit")]
    pub history_limit: Option<usize>,
    /// Seeded as the first message of a fresh entity's history.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_busy_reply")]
    pub busy_reply: String,
    #[serde(default = "default_processing_reply")]
    pub processing_reply: String,
    /// Sent when the skill chain produced no assistant content, or failed.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_history_limit() -> Option<usize> {
    Some(100)
}

fn default_busy_reply() -> String {
    "You have already sent a request. Expect a response".to_string()
}

fn default_processing_reply() -> String {
    "processing...".to_string()
}

fn default_fallback_reply() -> String {
    "Something went wrong while handling your request.".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            system_prompt: None,
            busy_reply: default_busy_reply(),
            processing_reply: default_processing_reply(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

impl ChatConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
