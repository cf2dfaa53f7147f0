use serde::{Deserialize, Serialize};

use super::options::AspectRatio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Error,
}

/// A web source backing a search-grounded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_urls: Vec<Citation>,
}

impl MessageMetadata {
    pub fn image(prompt: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            prompt: Some(prompt.into()),
            aspect_ratio: Some(aspect_ratio),
            grounding_urls: Vec::new(),
        }
    }

    pub fn grounded(grounding_urls: Vec<Citation>) -> Self {
        Self {
            grounding_urls,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.aspect_ratio.is_none() && self.grounding_urls.is_empty()
    }
}

/// One transcript entry. Image messages carry a `data:` URL as content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn is_image(&self) -> bool {
        self.kind == MessageKind::Image
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        self.metadata.as_ref().and_then(|meta| meta.aspect_ratio)
    }

    pub fn citations(&self) -> &[Citation] {
        self.metadata
            .as_ref()
            .map(|meta| meta.grounding_urls.as_slice())
            .unwrap_or_default()
    }
}
