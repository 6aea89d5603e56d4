//! Chat context and tool descriptors sent to the model backend.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The ordered conversation history for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub messages: Vec<ChatMessage>,
}

impl ChatContext {
    /// Creates a context whose first message carries the agent instructions.
    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        let mut ctx = Self::default();
        if !instructions.trim().is_empty() {
            ctx.push(ChatRole::System, instructions);
        }
        ctx
    }

    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A tool the model may call, in the JSON-schema form tool servers publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments object.
    #[serde(default = "empty_object_schema", rename = "inputSchema", alias = "parameters")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}
