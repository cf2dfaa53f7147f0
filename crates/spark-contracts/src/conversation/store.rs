use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::message::{Message, MessageKind, MessageMetadata, Role};

/// The visible transcript. Messages are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub created_at: String,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            created_at: now_utc_iso(),
            messages: Vec::new(),
        }
    }

    pub fn append(
        &mut self,
        role: Role,
        kind: MessageKind,
        content: impl Into<String>,
        metadata: Option<MessageMetadata>,
    ) -> &Message {
        let message = Message {
            id: self.next_message_id(),
            role,
            kind,
            content: content.into(),
            created_at: now_utc_iso(),
            metadata: metadata.filter(|meta| !meta.is_empty()),
        };
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_image(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.is_image())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn next_message_id(&self) -> String {
        format!("m{}", self.messages.len() + 1)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
