use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use spark_contracts::conversation::{
    AspectRatio, Attachment, Composer, Conversation, Message, MessageKind, MessageMetadata, Mode,
    Role, SendRequest,
};
use spark_contracts::events::{EventKind, EventLog};
use spark_contracts::models::{ModelSelection, ModelSelector, ModelSpec};
use spark_contracts::prompts::{
    classify_reference_edit, effective_prompt, reference_generation_prompt,
    reference_instruction, should_intercept, REFERENCE_ANALYSIS_INSTRUCTION,
};

use crate::config::SparkConfig;
use crate::error::{user_facing_message, GenerationError};
use crate::fallback::attempt_with_fallback;
use crate::service::{ChatSession, GeneratedImage, GenerativeService};

pub const WELCOME_MESSAGE: &str = "Hello! I am Spark AI, your multi-modal assistant. You can chat with me, ask me to generate or edit images, or search the web.\n\nTip: Use /model to switch between AI models!";

const EMPTY_CHAT_REPLY: &str = "I couldn't generate a text response.";
const EMPTY_SEARCH_REPLY: &str = "I found some results.";
const EMPTY_VISION_REPLY: &str = "I analyzed the image.";
const DEFAULT_VISION_QUESTION: &str = "Describe this image";

/// A chat-mode prompt held back until the user picks an aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGeneration {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Image intent detected in chat mode; waiting on `confirm_ratio`/`cancel_ratio`.
    Intercepted,
    /// Blank chat or search input; nothing was sent.
    Ignored,
    /// Exactly one assistant message (success or error) was appended.
    Completed {
        message_id: String,
        kind: MessageKind,
    },
}

struct AssistantReply {
    kind: MessageKind,
    content: String,
    metadata: Option<MessageMetadata>,
}

impl AssistantReply {
    fn text(content: String, metadata: Option<MessageMetadata>) -> Self {
        Self {
            kind: MessageKind::Text,
            content,
            metadata,
        }
    }

    fn image(image: &GeneratedImage, prompt: String, aspect_ratio: AspectRatio) -> Self {
        Self {
            kind: MessageKind::Image,
            content: image.data_url(),
            metadata: Some(MessageMetadata::image(prompt, aspect_ratio)),
        }
    }
}

/// Routes user input to the remote service and owns the conversation state:
/// the transcript, the pending-input buffer, the active chat model and its
/// session, and at most one intercepted generation.
pub struct Orchestrator {
    service: Box<dyn GenerativeService>,
    config: SparkConfig,
    models: ModelSelector,
    chat_model: String,
    session: Option<ChatSession>,
    conversation: Conversation,
    composer: Composer,
    pending: Option<PendingGeneration>,
    events: EventLog,
}

impl Orchestrator {
    pub fn new(
        service: Box<dyn GenerativeService>,
        config: SparkConfig,
        events_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let models = ModelSelector::new(None);
        let selection = models
            .select(Some(config.chat_model.as_str()), "text")
            .map_err(|err| anyhow!(err))?;
        let conversation = Conversation::new();
        let events = EventLog::new(events_path, conversation.conversation_id.clone());
        let orchestrator = Self {
            service,
            chat_model: selection.model.name.clone(),
            config,
            models,
            session: None,
            conversation,
            composer: Composer::new(),
            pending: None,
            events,
        };
        orchestrator.log(
            EventKind::ConversationStarted,
            json!({
                "service": orchestrator.service.name(),
                "chat_model": orchestrator.chat_model,
                "image_model": orchestrator.config.image_model,
                "image_fallback_model": orchestrator.config.image_fallback_model,
                "vision_model": orchestrator.config.vision_model,
                "fallback_reason": selection.fallback_reason,
            }),
        );
        Ok(orchestrator)
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn config(&self) -> &SparkConfig {
        &self.config
    }

    pub fn events_path(&self) -> &Path {
        self.events.path()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn pending_generation(&self) -> Option<&PendingGeneration> {
        self.pending.as_ref()
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn available_models(&self) -> Vec<ModelSpec> {
        self.models.registry.by_capability("text")
    }

    pub fn greet(&mut self) -> String {
        self.append(
            Role::Assistant,
            MessageKind::Text,
            WELCOME_MESSAGE.to_string(),
            None,
        )
    }

    /// Sends whatever the composer holds. Mode, ratio and style stay selected.
    pub fn send(&mut self) -> SendOutcome {
        let request = self.composer.take();
        self.handle_send(request)
    }

    pub fn handle_send(&mut self, request: SendRequest) -> SendOutcome {
        let text = request.text.trim().to_string();
        if text.is_empty() && request.attachments.is_empty() && request.mode != Mode::Image {
            return SendOutcome::Ignored;
        }
        if should_intercept(&text, request.mode, request.attachments.len()) {
            self.log(EventKind::GenerationIntercepted, json!({ "text": text }));
            self.pending = Some(PendingGeneration { text });
            return SendOutcome::Intercepted;
        }
        self.dispatch(SendRequest { text, ..request })
    }

    /// Promotes the intercepted prompt into an image generation at `aspect_ratio`.
    /// Returns `None` when nothing is pending.
    pub fn confirm_ratio(&mut self, aspect_ratio: AspectRatio) -> Option<SendOutcome> {
        let pending = self.pending.take()?;
        self.composer.set_mode(Mode::Image);
        self.composer.set_aspect_ratio(aspect_ratio);
        self.composer.clear_text();
        let request = SendRequest::new(pending.text, Mode::Image)
            .with_aspect_ratio(aspect_ratio)
            .with_style(self.composer.style());
        Some(self.dispatch(request))
    }

    pub fn cancel_ratio(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        self.log(EventKind::GenerationCancelled, json!({ "text": pending.text }));
        true
    }

    /// Switches the chat model and rebinds the session right away. Selecting
    /// the active model leaves the current session untouched.
    ///
    /// The switch stands even when the new session cannot be started: the
    /// error is returned, `session()` is `None`, `chat_model()` already names
    /// the new model, and the next chat send starts the session again.
    pub fn select_model(&mut self, requested: &str) -> Result<ModelSelection> {
        let selection = self
            .models
            .select(Some(requested.trim()), "text")
            .map_err(|err| anyhow!(err))?;
        if selection.model.name == self.chat_model {
            return Ok(selection);
        }
        self.chat_model = selection.model.name.clone();
        self.log(
            EventKind::ModelSelected,
            json!({
                "model": self.chat_model,
                "requested": selection.requested,
                "fallback_reason": selection.fallback_reason,
            }),
        );
        self.open_session()?;
        Ok(selection)
    }

    /// Seeds the composer with a generated image (the latest one when
    /// `message_id` is `None`). Returns false when there is no such image.
    pub fn reuse_image(&mut self, message_id: Option<&str>) -> bool {
        let message = match message_id {
            Some(id) => self.conversation.get(id),
            None => self.conversation.last_image(),
        };
        let Some(message) = message.filter(|message| message.is_image()) else {
            return false;
        };
        let (data_url, aspect_ratio) = (message.content.clone(), message.aspect_ratio());
        self.composer.reuse_image(&data_url, aspect_ratio)
    }

    fn dispatch(&mut self, request: SendRequest) -> SendOutcome {
        let user_content = if !request.text.is_empty() {
            Some(request.text.clone())
        } else if !request.attachments.is_empty() {
            Some(format!("Sent {} image(s)", request.attachments.len()))
        } else {
            None
        };
        if let Some(content) = user_content {
            self.append(Role::User, MessageKind::Text, content, None);
        }
        self.log(
            EventKind::RequestDispatched,
            json!({
                "mode": request.mode.as_str(),
                "attachments": request.attachments.len(),
                "aspect_ratio": request.aspect_ratio.as_str(),
                "style": request.style.key(),
            }),
        );

        let result = match request.mode {
            Mode::Image => self.run_image(&request),
            Mode::Search => self.run_search(&request.text),
            Mode::Chat if !request.attachments.is_empty() => {
                self.run_vision(&request.text, &request.attachments)
            }
            Mode::Chat => self.run_chat(&request.text),
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                let message = user_facing_message(&err);
                self.log(
                    EventKind::RequestFailed,
                    json!({ "mode": request.mode.as_str(), "error": message }),
                );
                AssistantReply {
                    kind: MessageKind::Error,
                    content: message,
                    metadata: None,
                }
            }
        };
        let kind = reply.kind;
        let message_id = self.append(Role::Assistant, kind, reply.content, reply.metadata);
        SendOutcome::Completed { message_id, kind }
    }

    fn run_chat(&mut self, text: &str) -> Result<AssistantReply> {
        self.ensure_session()?;
        let Some(session) = self.session.as_mut() else {
            bail!("chat session unavailable");
        };
        let reply = self.service.send_to_session(session, text)?;
        let citations = reply.citations();
        Ok(AssistantReply::text(
            or_placeholder(reply.text, EMPTY_CHAT_REPLY),
            Some(MessageMetadata::grounded(citations)),
        ))
    }

    fn run_search(&self, text: &str) -> Result<AssistantReply> {
        let reply = self.service.complete_with_search(&self.chat_model, text)?;
        let citations = reply.citations();
        Ok(AssistantReply::text(
            or_placeholder(reply.text, EMPTY_SEARCH_REPLY),
            Some(MessageMetadata::grounded(citations)),
        ))
    }

    fn run_vision(&self, text: &str, attachments: &[Attachment]) -> Result<AssistantReply> {
        let question = if text.is_empty() {
            DEFAULT_VISION_QUESTION
        } else {
            text
        };
        let description = self
            .service
            .complete_vision(&self.chat_model, question, attachments)?;
        Ok(AssistantReply::text(
            or_placeholder(description, EMPTY_VISION_REPLY),
            None,
        ))
    }

    fn run_image(&self, request: &SendRequest) -> Result<AssistantReply> {
        let effective = effective_prompt(&request.text, request.style);
        let aspect_ratio = request.aspect_ratio;

        if request.attachments.is_empty() {
            if request.text.is_empty() {
                return Err(GenerationError::EmptyPrompt.into());
            }
            let image = self.generate_with_fallback(&effective, aspect_ratio)?;
            return Ok(AssistantReply::image(&image, effective, aspect_ratio));
        }

        let edit = classify_reference_edit(&request.text, request.attachments.len());
        let instruction = reference_instruction(&effective, &request.text, edit);
        let description = self
            .service
            .complete_vision(
                &self.config.vision_model,
                REFERENCE_ANALYSIS_INSTRUCTION,
                &request.attachments,
            )
            .context("reference image analysis failed")?;
        let prompt = reference_generation_prompt(&instruction, &description);
        let image = self.generate_with_fallback(&prompt, aspect_ratio)?;
        Ok(AssistantReply::image(&image, effective, aspect_ratio))
    }

    fn generate_with_fallback(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<GeneratedImage> {
        let primary = self.config.image_model.as_str();
        let attempted = attempt_with_fallback(
            primary,
            &self.config.image_fallback_model,
            |model| self.service.generate_image(model, prompt, aspect_ratio),
            |image: Option<GeneratedImage>| image.filter(|image| !image.data.is_empty()),
            |reason| {
                self.log(
                    EventKind::ImagePrimaryFailed,
                    json!({ "model": primary, "reason": reason }),
                )
            },
        )?;
        if let Some(reason) = &attempted.primary_failure {
            self.log(
                EventKind::ImageFallbackUsed,
                json!({ "model": attempted.target, "primary_failure": reason }),
            );
        }
        Ok(attempted.value)
    }

    /// A session exists and is bound to the active model after this returns Ok.
    fn ensure_session(&mut self) -> Result<()> {
        let current = self
            .session
            .as_ref()
            .map(|session| session.model == self.chat_model)
            .unwrap_or(false);
        if current {
            return Ok(());
        }
        self.open_session()
    }

    fn open_session(&mut self) -> Result<()> {
        self.session = None;
        let session = self
            .service
            .create_session(&self.chat_model, &self.config.system_instruction)
            .with_context(|| format!("failed to start chat session for {}", self.chat_model))?;
        self.log(
            EventKind::SessionCreated,
            json!({ "session_id": session.id, "model": session.model }),
        );
        self.session = Some(session);
        Ok(())
    }

    fn append(
        &mut self,
        role: Role,
        kind: MessageKind,
        content: String,
        metadata: Option<MessageMetadata>,
    ) -> String {
        let message_id = self.conversation.append(role, kind, content, metadata).id.clone();
        self.log(
            EventKind::MessageAppended,
            json!({ "message_id": message_id, "role": role, "kind": kind }),
        );
        message_id
    }

    fn log(&self, kind: EventKind, payload: Value) {
        if let Err(err) = self.events.record(kind, payload) {
            eprintln!("spark warning: failed to log {}: {err:#}", kind.as_str());
        }
    }
}

fn or_placeholder(text: String, placeholder: &str) -> String {
    if text.trim().is_empty() {
        placeholder.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use anyhow::Result;
    use serde_json::Value;
    use spark_contracts::conversation::{
        AspectRatio, Attachment, ImageStyle, MessageKind, Mode, Role, SendRequest,
        REUSE_INSTRUCTION,
    };
    use spark_contracts::prompts::{classify_reference_edit, REFERENCE_ANALYSIS_INSTRUCTION};
    use tempfile::TempDir;

    use super::{Orchestrator, SendOutcome, WELCOME_MESSAGE};
    use crate::config::SparkConfig;
    use crate::error::GenerationError;
    use crate::service::{GroundingChunk, TextReply, WebSource};
    use crate::testing::{recorded, sample_image, Call, CallLog, Script, ScriptedService};

    const PRIMARY: &str = "imagen-3.0-generate-001";
    const FALLBACK: &str = "gemini-2.0-flash-exp";

    fn start(service: ScriptedService) -> Result<(Orchestrator, CallLog, TempDir)> {
        let dir = tempfile::tempdir()?;
        let log = service.call_log();
        let orchestrator = Orchestrator::new(
            Box::new(service),
            SparkConfig::default(),
            dir.path().join("events.jsonl"),
        )?;
        Ok((orchestrator, log, dir))
    }

    fn read_events(path: &Path) -> Result<Vec<Value>> {
        let raw = fs::read_to_string(path)?;
        raw.lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    fn event_types(path: &Path) -> Result<Vec<String>> {
        Ok(read_events(path)?
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn attachments(count: usize) -> Vec<Attachment> {
        (0..count)
            .map(|idx| Attachment::new(format!("a{idx}"), "image/png", "iVBORw0KGgo="))
            .collect()
    }

    fn completed_kind(outcome: &SendOutcome) -> Option<MessageKind> {
        match outcome {
            SendOutcome::Completed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[test]
    fn image_intent_in_chat_is_intercepted_without_remote_calls() -> Result<()> {
        let (mut orchestrator, log, dir) = start(ScriptedService::new())?;
        orchestrator.composer_mut().set_text("draw a cat");

        assert_eq!(orchestrator.send(), SendOutcome::Intercepted);
        assert!(recorded(&log).is_empty());
        assert!(orchestrator.messages().is_empty());
        assert_eq!(
            orchestrator.pending_generation().map(|pending| pending.text.as_str()),
            Some("draw a cat")
        );
        assert!(event_types(&dir.path().join("events.jsonl"))?
            .contains(&"generation_intercepted".to_string()));
        Ok(())
    }

    #[test]
    fn confirming_ratio_issues_exactly_one_generation() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        orchestrator.composer_mut().set_text("draw a cat");
        assert_eq!(orchestrator.send(), SendOutcome::Intercepted);

        let outcome = orchestrator.confirm_ratio(AspectRatio::Landscape);
        assert_eq!(outcome.as_ref().and_then(completed_kind), Some(MessageKind::Image));
        assert_eq!(
            recorded(&log),
            vec![Call::Image {
                model: PRIMARY.to_string(),
                prompt: "Photorealistic image of draw a cat".to_string(),
                aspect_ratio: AspectRatio::Landscape,
            }]
        );

        let messages = orchestrator.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "draw a cat");
        assert_eq!(messages[1].aspect_ratio(), Some(AspectRatio::Landscape));
        assert_eq!(messages[1].content, sample_image(PRIMARY).data_url());
        assert_eq!(orchestrator.composer().mode(), Mode::Image);
        assert_eq!(orchestrator.composer().aspect_ratio(), AspectRatio::Landscape);
        assert!(orchestrator.pending_generation().is_none());

        assert!(orchestrator.confirm_ratio(AspectRatio::Square).is_none());
        assert_eq!(recorded(&log).len(), 1);
        Ok(())
    }

    #[test]
    fn cancelling_ratio_discards_pending_prompt() -> Result<()> {
        let (mut orchestrator, log, dir) = start(ScriptedService::new())?;
        let outcome = orchestrator.handle_send(SendRequest::new("a picture of a dog", Mode::Chat));
        assert_eq!(outcome, SendOutcome::Intercepted);

        assert!(orchestrator.cancel_ratio());
        assert!(!orchestrator.cancel_ratio());
        assert!(orchestrator.pending_generation().is_none());
        assert!(orchestrator.messages().is_empty());
        assert!(recorded(&log).is_empty());
        assert!(event_types(&dir.path().join("events.jsonl"))?
            .contains(&"generation_cancelled".to_string()));
        Ok(())
    }

    #[test]
    fn image_intent_outside_chat_is_not_intercepted() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        let outcome = orchestrator.handle_send(SendRequest::new("draw a cat", Mode::Search));
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Text));

        let outcome = orchestrator.handle_send(
            SendRequest::new("draw a cat", Mode::Chat).with_attachments(attachments(1)),
        );
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Text));
        assert!(orchestrator.pending_generation().is_none());
        assert_eq!(recorded(&log).len(), 2);
        Ok(())
    }

    #[test]
    fn search_with_empty_text_uses_placeholder() -> Result<()> {
        let service = ScriptedService::new().with_search(Script::Reply(TextReply::text("")));
        let (mut orchestrator, log, _dir) = start(service)?;

        orchestrator.handle_send(SendRequest::new("current weather in Tokyo", Mode::Search));
        assert_eq!(
            recorded(&log),
            vec![Call::Search {
                model: "gemini-2.0-flash".to_string(),
                text: "current weather in Tokyo".to_string(),
            }]
        );
        let reply = orchestrator.messages().last().map(|message| message.content.clone());
        assert_eq!(reply.as_deref(), Some("I found some results."));
        Ok(())
    }

    #[test]
    fn search_citations_keep_only_web_chunks() -> Result<()> {
        let reply = TextReply {
            text: "Sunny, 21C.".to_string(),
            grounding_chunks: vec![
                GroundingChunk {
                    web: Some(WebSource {
                        title: Some("jma.go.jp".to_string()),
                        uri: Some("https://www.jma.go.jp".to_string()),
                    }),
                },
                GroundingChunk { web: None },
            ],
        };
        let service = ScriptedService::new().with_search(Script::Reply(reply));
        let (mut orchestrator, _log, _dir) = start(service)?;

        orchestrator.handle_send(SendRequest::new("weather in Tokyo", Mode::Search));
        let message = orchestrator.messages().last().cloned();
        let citations = message
            .as_ref()
            .map(|message| message.citations().to_vec())
            .unwrap_or_default();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].uri, "https://www.jma.go.jp");
        Ok(())
    }

    #[test]
    fn chat_with_attachments_goes_to_vision() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        let text = "add my character to this scene";
        let outcome = orchestrator
            .handle_send(SendRequest::new(text, Mode::Chat).with_attachments(attachments(2)));

        assert_eq!(completed_kind(&outcome), Some(MessageKind::Text));
        assert_eq!(
            recorded(&log),
            vec![Call::Vision {
                model: "gemini-2.0-flash".to_string(),
                text: text.to_string(),
                images: 2,
            }]
        );
        assert!(orchestrator.session().is_none());
        assert!(classify_reference_edit(text, 2).merge);
        assert!(classify_reference_edit("make it nicer", 2).merge);
        Ok(())
    }

    #[test]
    fn empty_vision_and_chat_replies_use_placeholders() -> Result<()> {
        let service = ScriptedService::new()
            .with_chat(Script::Reply("   ".to_string()))
            .with_vision(Script::Reply(String::new()));
        let (mut orchestrator, log, _dir) = start(service)?;

        orchestrator.handle_send(SendRequest::new("", Mode::Chat).with_attachments(attachments(1)));
        orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));

        let contents: Vec<&str> = orchestrator
            .messages()
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(
            contents,
            vec![
                "Sent 1 image(s)",
                "I analyzed the image.",
                "hello",
                "I couldn't generate a text response."
            ]
        );
        assert!(recorded(&log).contains(&Call::Vision {
            model: "gemini-2.0-flash".to_string(),
            text: "Describe this image".to_string(),
            images: 1,
        }));
        Ok(())
    }

    #[test]
    fn both_image_tiers_failing_yields_one_error_message() -> Result<()> {
        let service = ScriptedService::new()
            .with_image(PRIMARY, Script::Fail("imagen unavailable".to_string()))
            .with_image(FALLBACK, Script::Fail("fallback unavailable".to_string()));
        let (mut orchestrator, log, dir) = start(service)?;

        let outcome = orchestrator.handle_send(SendRequest::new("a lighthouse", Mode::Image));
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Error));

        let models: Vec<String> = recorded(&log)
            .into_iter()
            .filter_map(|call| match call {
                Call::Image { model, .. } => Some(model),
                _ => None,
            })
            .collect();
        assert_eq!(models, vec![PRIMARY.to_string(), FALLBACK.to_string()]);

        let messages = orchestrator.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].is_error());
        assert!(!messages[1].content.starts_with("data:"));
        assert!(messages[1].content.contains("fallback unavailable"));
        assert!(messages[1].metadata.is_none());

        let types = event_types(&dir.path().join("events.jsonl"))?;
        assert!(types.contains(&"image_primary_failed".to_string()));
        assert!(types.contains(&"request_failed".to_string()));
        Ok(())
    }

    #[test]
    fn fallback_tier_answers_when_primary_fails() -> Result<()> {
        let service =
            ScriptedService::new().with_image(PRIMARY, Script::Fail("503".to_string()));
        let (mut orchestrator, _log, dir) = start(service)?;

        orchestrator.handle_send(
            SendRequest::new("a lighthouse", Mode::Image).with_aspect_ratio(AspectRatio::Tall),
        );
        let message = orchestrator.messages().last().cloned();
        let Some(message) = message else {
            panic!("expected an assistant message");
        };
        assert!(message.is_image());
        assert_eq!(message.content, sample_image(FALLBACK).data_url());
        assert_eq!(message.aspect_ratio(), Some(AspectRatio::Tall));

        let fallback_event = read_events(&dir.path().join("events.jsonl"))?
            .into_iter()
            .find(|event| event["type"] == "image_fallback_used");
        assert_eq!(
            fallback_event.map(|event| event["model"].clone()),
            Some(Value::String(FALLBACK.to_string()))
        );
        Ok(())
    }

    #[test]
    fn empty_results_from_both_tiers_are_blocked() -> Result<()> {
        let service = ScriptedService::new()
            .with_image(PRIMARY, Script::Reply(None))
            .with_image(FALLBACK, Script::Reply(None));
        let (mut orchestrator, _log, _dir) = start(service)?;

        orchestrator.handle_send(SendRequest::new("a lighthouse", Mode::Image));
        let last = orchestrator.messages().last().map(|message| message.content.clone());
        assert_eq!(last, Some(GenerationError::Blocked.to_string()));
        Ok(())
    }

    #[test]
    fn blank_image_prompt_fails_without_remote_call() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;

        assert_eq!(
            orchestrator.handle_send(SendRequest::new("  ", Mode::Chat)),
            SendOutcome::Ignored
        );
        let outcome = orchestrator.handle_send(SendRequest::new("  ", Mode::Image));
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Error));
        assert!(recorded(&log).is_empty());

        let messages = orchestrator.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, GenerationError::EmptyPrompt.to_string());
        Ok(())
    }

    #[test]
    fn style_handling_shapes_the_dispatched_prompt() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;

        orchestrator.handle_send(
            SendRequest::new("a fox", Mode::Image).with_style(ImageStyle::Anime),
        );
        orchestrator.handle_send(SendRequest::new("an anime fox", Mode::Image));

        let prompts: Vec<String> = recorded(&log)
            .into_iter()
            .filter_map(|call| match call {
                Call::Image { prompt, .. } => Some(prompt),
                _ => None,
            })
            .collect();
        assert_eq!(
            prompts,
            vec![
                "a fox. Style: anime style.".to_string(),
                "an anime fox".to_string()
            ]
        );
        Ok(())
    }

    #[test]
    fn reference_images_are_analyzed_before_generation() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        let text = "put me in a wedding dress in this place";

        let outcome = orchestrator.handle_send(
            SendRequest::new(text, Mode::Image)
                .with_aspect_ratio(AspectRatio::Portrait)
                .with_attachments(attachments(2)),
        );
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Image));

        let calls = recorded(&log);
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            Call::Vision {
                model: "gemini-1.5-flash".to_string(),
                text: REFERENCE_ANALYSIS_INSTRUCTION.to_string(),
                images: 2,
            }
        );
        let Call::Image {
            model,
            prompt,
            aspect_ratio,
        } = &calls[1]
        else {
            panic!("expected an image call, got {:?}", calls[1]);
        };
        assert_eq!(model, PRIMARY);
        assert_eq!(*aspect_ratio, AspectRatio::Portrait);
        assert!(prompt.contains("CHANGE CLOTHING"));
        assert!(!prompt.contains("CHANGE BACKGROUND"));
        assert!(prompt.contains("MERGE"));
        assert!(prompt.contains("A person with short dark hair."));
        assert!(prompt.ends_with("Style: Photorealistic, High Quality."));

        let metadata = orchestrator
            .messages()
            .last()
            .and_then(|message| message.metadata.clone());
        assert_eq!(
            metadata.and_then(|meta| meta.prompt),
            Some(format!("Photorealistic image of {text}"))
        );
        Ok(())
    }

    #[test]
    fn reference_analysis_failure_skips_generation() -> Result<()> {
        let service =
            ScriptedService::new().with_vision(Script::Fail("vision quota exceeded".to_string()));
        let (mut orchestrator, log, _dir) = start(service)?;

        let outcome = orchestrator.handle_send(
            SendRequest::new("add me", Mode::Image).with_attachments(attachments(1)),
        );
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Error));
        assert!(!recorded(&log)
            .iter()
            .any(|call| matches!(call, Call::Image { .. })));
        let last = orchestrator.messages().last().map(|message| message.content.clone());
        let last = last.unwrap_or_default();
        assert!(last.starts_with("reference image analysis failed"));
        assert!(last.contains("vision quota exceeded"));
        Ok(())
    }

    #[test]
    fn chat_failure_is_not_retried() -> Result<()> {
        let service = ScriptedService::new().with_chat(Script::Fail("quota exceeded".to_string()));
        let (mut orchestrator, log, _dir) = start(service)?;

        let outcome = orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Error));
        let sends = recorded(&log)
            .iter()
            .filter(|call| matches!(call, Call::SendToSession { .. }))
            .count();
        assert_eq!(sends, 1);
        assert_eq!(
            orchestrator.messages().last().map(|message| message.content.as_str()),
            Some("quota exceeded")
        );
        Ok(())
    }

    #[test]
    fn reselecting_active_model_keeps_the_session() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));
        let session_id = orchestrator.session().map(|session| session.id.clone());

        orchestrator.select_model("gemini-2.0-flash")?;
        orchestrator.select_model("gemini-2.0-flash")?;
        orchestrator.handle_send(SendRequest::new("again", Mode::Chat));

        assert_eq!(
            orchestrator.session().map(|session| session.id.clone()),
            session_id
        );
        assert_eq!(orchestrator.session().map(|session| session.history.len()), Some(4));
        let created = recorded(&log)
            .iter()
            .filter(|call| matches!(call, Call::CreateSession { .. }))
            .count();
        assert_eq!(created, 1);
        Ok(())
    }

    #[test]
    fn model_change_rebinds_session_before_next_send() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));
        let first_session = orchestrator.session().map(|session| session.id.clone());

        let selection = orchestrator.select_model("gemini-1.5-flash")?;
        assert_eq!(selection.model.name, "gemini-1.5-flash");
        assert_eq!(orchestrator.chat_model(), "gemini-1.5-flash");
        let second_session = orchestrator.session().map(|session| session.id.clone());
        assert_ne!(first_session, second_session);

        orchestrator.handle_send(SendRequest::new("still there?", Mode::Chat));
        let calls = recorded(&log);
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls.iter().filter(|call| call.is_remote_generation()).count(),
            2
        );
        let Some(Call::SendToSession {
            model, session_id, ..
        }) = calls.last()
        else {
            panic!("expected a chat send, got {:?}", calls.last());
        };
        assert_eq!(model, "gemini-1.5-flash");
        assert_eq!(Some(session_id.clone()), second_session);
        Ok(())
    }

    #[test]
    fn failed_rebind_is_recovered_on_next_chat_send() -> Result<()> {
        let service = ScriptedService::new().with_session_failures(&["session quota exceeded"]);
        let (mut orchestrator, log, dir) = start(service)?;

        let err = orchestrator
            .select_model("gemini-1.5-flash")
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(err.contains("failed to start chat session for gemini-1.5-flash"));
        assert!(err.contains("session quota exceeded"));
        assert_eq!(orchestrator.chat_model(), "gemini-1.5-flash");
        assert!(orchestrator.session().is_none());

        let outcome = orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Text));
        let session = orchestrator.session().cloned();
        let Some(session) = session else {
            panic!("expected a live session after the chat send");
        };
        assert_eq!(session.model, "gemini-1.5-flash");

        assert_eq!(
            recorded(&log),
            vec![
                Call::CreateSession {
                    model: "gemini-1.5-flash".to_string(),
                    session_id: session.id.clone(),
                },
                Call::SendToSession {
                    model: "gemini-1.5-flash".to_string(),
                    session_id: session.id.clone(),
                    text: "hello".to_string(),
                },
            ]
        );
        let types = event_types(&dir.path().join("events.jsonl"))?;
        assert_eq!(
            types.iter().filter(|kind| *kind == "session_created").count(),
            1
        );
        Ok(())
    }

    #[test]
    fn unknown_model_falls_back_to_default_chat_model() -> Result<()> {
        let (mut orchestrator, _log, _dir) = start(ScriptedService::new())?;
        let selection = orchestrator.select_model("imagen-3.0-generate-001")?;
        assert!(selection.fallback_reason.is_some());
        assert_eq!(orchestrator.chat_model(), "gemini-2.0-flash");
        assert!(orchestrator.session().is_none());
        Ok(())
    }

    #[test]
    fn reuse_image_seeds_the_composer() -> Result<()> {
        let (mut orchestrator, _log, _dir) = start(ScriptedService::new())?;
        assert!(!orchestrator.reuse_image(None));

        orchestrator.handle_send(
            SendRequest::new("a castle", Mode::Image).with_aspect_ratio(AspectRatio::Classic),
        );
        orchestrator.composer_mut().set_mode(Mode::Chat);
        orchestrator.composer_mut().set_aspect_ratio(AspectRatio::Square);

        let user_message_id = orchestrator.messages()[0].id.clone();
        assert!(!orchestrator.reuse_image(Some(&user_message_id)));
        assert!(orchestrator.reuse_image(None));

        let composer = orchestrator.composer();
        assert_eq!(composer.mode(), Mode::Image);
        assert_eq!(composer.aspect_ratio(), AspectRatio::Classic);
        assert_eq!(composer.text(), REUSE_INSTRUCTION);
        assert_eq!(composer.attachments().len(), 1);
        assert_eq!(
            composer.attachments()[0].data_url(),
            sample_image(PRIMARY).data_url()
        );
        Ok(())
    }

    #[test]
    fn send_drains_composer_but_keeps_selections() -> Result<()> {
        let (mut orchestrator, log, _dir) = start(ScriptedService::new())?;
        let composer = orchestrator.composer_mut();
        composer.set_mode(Mode::Image);
        composer.set_aspect_ratio(AspectRatio::Portrait);
        composer.set_text("a city at night, cyberpunk photo");

        orchestrator.send();
        let composer = orchestrator.composer();
        assert_eq!(composer.text(), "");
        assert_eq!(composer.mode(), Mode::Image);
        assert_eq!(composer.aspect_ratio(), AspectRatio::Portrait);
        assert_eq!(
            recorded(&log),
            vec![Call::Image {
                model: PRIMARY.to_string(),
                prompt: "a city at night, cyberpunk photo".to_string(),
                aspect_ratio: AspectRatio::Portrait,
            }]
        );
        Ok(())
    }

    #[test]
    fn event_log_tracks_conversation() -> Result<()> {
        let (mut orchestrator, _log, dir) = start(ScriptedService::new())?;
        let welcome_id = orchestrator.greet();
        orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));

        assert_eq!(orchestrator.messages()[0].id, welcome_id);
        assert_eq!(orchestrator.messages()[0].content, WELCOME_MESSAGE);

        let events = read_events(&dir.path().join("events.jsonl"))?;
        assert_eq!(events[0]["type"], "conversation_started");
        assert_eq!(events[0]["service"], "scripted");
        let sequence: Vec<u64> = events
            .iter()
            .filter_map(|event| event["seq"].as_u64())
            .collect();
        assert_eq!(sequence, (1..=events.len() as u64).collect::<Vec<u64>>());
        let conversation_id = orchestrator.conversation().conversation_id.clone();
        assert!(events
            .iter()
            .all(|event| event["conversation_id"] == conversation_id.as_str()));
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "conversation_started",
                "message_appended",
                "message_appended",
                "request_dispatched",
                "session_created",
                "message_appended",
            ]
        );
        Ok(())
    }

    #[test]
    fn unwritable_event_log_does_not_change_outcome() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x")?;
        let mut orchestrator = Orchestrator::new(
            Box::new(ScriptedService::new()),
            SparkConfig::default(),
            blocker.join("events.jsonl"),
        )?;

        let outcome = orchestrator.handle_send(SendRequest::new("hello", Mode::Chat));
        assert_eq!(completed_kind(&outcome), Some(MessageKind::Text));
        assert_eq!(orchestrator.messages().len(), 2);
        Ok(())
    }
}
