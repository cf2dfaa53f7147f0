use anyhow::Result;
use spark_contracts::conversation::{AspectRatio, Attachment, Citation};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

/// Conversational state bound to one model identity. The orchestrator owns at
/// most one and replaces it wholesale when the model changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub model: String,
    pub system_instruction: String,
    pub history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(model: &str, system_instruction: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model: model.to_string(),
            system_instruction: system_instruction.to_string(),
            history: Vec::new(),
        }
    }

    pub fn record_exchange(&mut self, user_text: &str, reply_text: &str) {
        self.history.push(ChatTurn {
            role: "user".to_string(),
            text: user_text.to_string(),
        });
        self.history.push(ChatTurn {
            role: "model".to_string(),
            text: reply_text.to_string(),
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebSource {
    pub title: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextReply {
    pub text: String,
    pub grounding_chunks: Vec<GroundingChunk>,
}

impl TextReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding_chunks: Vec::new(),
        }
    }

    /// Only chunks carrying a web source become citations.
    pub fn citations(&self) -> Vec<Citation> {
        self.grounding_chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .map(|web| Citation {
                title: web.title.clone().unwrap_or_default(),
                uri: web.uri.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: String,
}

impl GeneratedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// The remote generative API as the orchestrator sees it.
///
/// `generate_image` returns `Ok(None)` when the call completed but produced no
/// image (e.g. a safety filter rejected the prompt).
pub trait GenerativeService: Send + Sync {
    fn name(&self) -> &str;
    fn create_session(&self, model: &str, system_instruction: &str) -> Result<ChatSession>;
    fn send_to_session(&self, session: &mut ChatSession, text: &str) -> Result<TextReply>;
    fn complete_with_search(&self, model: &str, text: &str) -> Result<TextReply>;
    fn complete_vision(&self, model: &str, text: &str, images: &[Attachment]) -> Result<String>;
    fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<GeneratedImage>>;
}
