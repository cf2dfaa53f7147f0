use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use spark_contracts::conversation::{AspectRatio, Attachment};

use crate::service::{ChatSession, GeneratedImage, GenerativeService, TextReply};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    CreateSession {
        model: String,
        session_id: String,
    },
    SendToSession {
        model: String,
        session_id: String,
        text: String,
    },
    Search {
        model: String,
        text: String,
    },
    Vision {
        model: String,
        text: String,
        images: usize,
    },
    Image {
        model: String,
        prompt: String,
        aspect_ratio: AspectRatio,
    },
}

impl Call {
    pub(crate) fn is_remote_generation(&self) -> bool {
        !matches!(self, Call::CreateSession { .. })
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Script<T> {
    Reply(T),
    Fail(String),
}

impl<T: Clone> Script<T> {
    fn play(&self) -> Result<T> {
        match self {
            Script::Reply(value) => Ok(value.clone()),
            Script::Fail(message) => Err(anyhow!("{message}")),
        }
    }
}

pub(crate) type CallLog = Arc<Mutex<Vec<Call>>>;

/// In-memory service that records every call and replays scripted results.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedService {
    calls: CallLog,
    chat: Script<String>,
    search: Script<TextReply>,
    vision: Script<String>,
    images: HashMap<String, Script<Option<GeneratedImage>>>,
    session_failures: Arc<Mutex<Vec<String>>>,
}

impl ScriptedService {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            chat: Script::Reply("Hi there!".to_string()),
            search: Script::Reply(TextReply::text("Search answer.")),
            vision: Script::Reply("A person with short dark hair.".to_string()),
            images: HashMap::new(),
            session_failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    pub(crate) fn with_chat(mut self, script: Script<String>) -> Self {
        self.chat = script;
        self
    }

    pub(crate) fn with_search(mut self, script: Script<TextReply>) -> Self {
        self.search = script;
        self
    }

    pub(crate) fn with_vision(mut self, script: Script<String>) -> Self {
        self.vision = script;
        self
    }

    /// Models without a script return [`sample_image`].
    pub(crate) fn with_image(mut self, model: &str, script: Script<Option<GeneratedImage>>) -> Self {
        self.images.insert(model.to_string(), script);
        self
    }

    /// The next `create_session` calls fail, one per message, in order.
    pub(crate) fn with_session_failures(self, messages: &[&str]) -> Self {
        if let Ok(mut failures) = self.session_failures.lock() {
            failures.extend(messages.iter().rev().map(|message| message.to_string()));
        }
        self
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("call log poisoned"))?
            .push(call);
        Ok(())
    }
}

impl GenerativeService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_session(&self, model: &str, system_instruction: &str) -> Result<ChatSession> {
        let failure = self
            .session_failures
            .lock()
            .map_err(|_| anyhow!("session script poisoned"))?
            .pop();
        if let Some(message) = failure {
            return Err(anyhow!("{message}"));
        }
        let session = ChatSession::new(model, system_instruction);
        self.record(Call::CreateSession {
            model: model.to_string(),
            session_id: session.id.clone(),
        })?;
        Ok(session)
    }

    fn send_to_session(&self, session: &mut ChatSession, text: &str) -> Result<TextReply> {
        self.record(Call::SendToSession {
            model: session.model.clone(),
            session_id: session.id.clone(),
            text: text.to_string(),
        })?;
        let reply = self.chat.play()?;
        session.record_exchange(text, &reply);
        Ok(TextReply::text(reply))
    }

    fn complete_with_search(&self, model: &str, text: &str) -> Result<TextReply> {
        self.record(Call::Search {
            model: model.to_string(),
            text: text.to_string(),
        })?;
        self.search.play()
    }

    fn complete_vision(&self, model: &str, text: &str, images: &[Attachment]) -> Result<String> {
        self.record(Call::Vision {
            model: model.to_string(),
            text: text.to_string(),
            images: images.len(),
        })?;
        self.vision.play()
    }

    fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<GeneratedImage>> {
        self.record(Call::Image {
            model: model.to_string(),
            prompt: prompt.to_string(),
            aspect_ratio,
        })?;
        match self.images.get(model) {
            Some(script) => script.play(),
            None => Ok(Some(sample_image(model))),
        }
    }
}

/// A recognisable payload per model, so tests can tell which tier answered.
pub(crate) fn sample_image(model: &str) -> GeneratedImage {
    GeneratedImage {
        mime_type: "image/png".to_string(),
        data: format!("{}-bytes", model.replace(['.', '-'], "")),
    }
}

pub(crate) fn recorded(log: &CallLog) -> Vec<Call> {
    log.lock().map(|calls| calls.clone()).unwrap_or_default()
}
