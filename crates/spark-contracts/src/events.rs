use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything the orchestrator records about a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConversationStarted,
    SessionCreated,
    ModelSelected,
    GenerationIntercepted,
    GenerationCancelled,
    RequestDispatched,
    ImagePrimaryFailed,
    ImageFallbackUsed,
    MessageAppended,
    RequestFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::ConversationStarted,
        EventKind::SessionCreated,
        EventKind::ModelSelected,
        EventKind::GenerationIntercepted,
        EventKind::GenerationCancelled,
        EventKind::RequestDispatched,
        EventKind::ImagePrimaryFailed,
        EventKind::ImageFallbackUsed,
        EventKind::MessageAppended,
        EventKind::RequestFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ConversationStarted => "conversation_started",
            EventKind::SessionCreated => "session_created",
            EventKind::ModelSelected => "model_selected",
            EventKind::GenerationIntercepted => "generation_intercepted",
            EventKind::GenerationCancelled => "generation_cancelled",
            EventKind::RequestDispatched => "request_dispatched",
            EventKind::ImagePrimaryFailed => "image_primary_failed",
            EventKind::ImageFallbackUsed => "image_fallback_used",
            EventKind::MessageAppended => "message_appended",
            EventKind::RequestFailed => "request_failed",
        }
    }
}

const RESERVED_KEYS: [&str; 4] = ["type", "conversation_id", "seq", "ts"];

/// JSONL log for one conversation.
///
/// Each line carries `type`, `conversation_id`, a per-log `seq` starting at 1
/// and `ts`, followed by the payload fields. Payload keys never replace those
/// four. The file is opened on the first record and kept open; a failed open
/// is retried on the next record and does not consume a sequence number.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    conversation_id: String,
    state: Mutex<LogState>,
}

#[derive(Debug, Default)]
struct LogState {
    file: Option<File>,
    seq: u64,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, conversation_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            conversation_id: conversation_id.into(),
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn record(&self, kind: EventKind, payload: Value) -> anyhow::Result<Value> {
        let fields = match payload {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => bail!("{} payload must be a JSON object, got {other}", kind.as_str()),
        };

        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if state.file.is_none() {
            state.file = Some(self.open()?);
        }
        let seq = state.seq + 1;

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "conversation_id".to_string(),
            Value::String(self.conversation_id.clone()),
        );
        event.insert("seq".to_string(), Value::from(seq));
        event.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        for (key, value) in fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                event.insert(key, value);
            }
        }
        let event = Value::Object(event);

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let Some(file) = state.file.as_mut() else {
            bail!("event log {} is not open", self.path.display());
        };
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        state.seq = seq;
        Ok(event)
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))
    }
}
