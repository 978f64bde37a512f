//! Conversation Model
//!
//! Role-tagged messages and the bounded history a session keeps for its
//! generation backend. The first entry of a [`History`] is always the system
//! prompt and survives every compaction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Maximum number of entries kept in a history: the system prompt plus ten
/// user/assistant exchanges.
pub const MAX_HISTORY_LEN: usize = 21;

/// The author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// An ordered, bounded conversation history anchored on a system prompt.
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    /// Creates a history whose first entry is the given system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Appends one completed exchange and compacts if the cap is exceeded.
    ///
    /// Compaction keeps the system prompt followed by the most recent
    /// `MAX_HISTORY_LEN - 1` entries.
    pub fn push_exchange(&mut self, user: Message, assistant: Message) {
        self.messages.push(user);
        self.messages.push(assistant);

        if self.messages.len() > MAX_HISTORY_LEN {
            let overflow = self.messages.len() - MAX_HISTORY_LEN;
            self.messages.drain(1..=overflow);
        }
    }

    pub fn system_prompt(&self) -> &Message {
        &self.messages[0]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns a copy of the history with a pending user message appended,
    /// ready to be handed to a generation backend.
    pub fn with_pending(&self, pending: Message) -> Vec<Message> {
        let mut snapshot = self.messages.clone();
        snapshot.push(pending);
        snapshot
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
