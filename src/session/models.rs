//! Conversation data models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One transcript entry. Owned exclusively by the session; assistant
/// messages start empty and are mutated as the stream decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
        }
    }
}

/// One stored turn from the upstream history endpoint. Either side may
/// be empty and is then skipped during transcript restore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
}
