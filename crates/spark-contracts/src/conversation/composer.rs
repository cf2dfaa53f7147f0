use chrono::Utc;

use super::attachment::Attachment;
use super::options::{AspectRatio, ImageStyle, Mode};

pub const REUSE_INSTRUCTION: &str = "Add my character to this image";

/// Everything the orchestrator needs for one send.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendRequest {
    pub text: String,
    pub mode: Mode,
    pub aspect_ratio: AspectRatio,
    pub style: ImageStyle,
    pub attachments: Vec<Attachment>,
}

impl SendRequest {
    pub fn new(text: impl Into<String>, mode: Mode) -> Self {
        Self {
            text: text.into(),
            mode,
            ..Self::default()
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_style(mut self, style: ImageStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Pending-input buffer. Text and attachments are consumed by `take`;
/// mode, aspect ratio and style stay selected across sends.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    text: String,
    mode: Mode,
    aspect_ratio: AspectRatio,
    style: ImageStyle,
    attachments: Vec<Attachment>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.aspect_ratio = aspect_ratio;
    }

    pub fn style(&self) -> ImageStyle {
        self.style
    }

    pub fn set_style(&mut self, style: ImageStyle) {
        self.style = style;
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub fn remove_attachment(&mut self, id: &str) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|attachment| attachment.id != id);
        self.attachments.len() != before
    }

    pub fn clear_text(&mut self) {
        self.text.clear();
    }

    pub fn take(&mut self) -> SendRequest {
        SendRequest {
            text: std::mem::take(&mut self.text),
            mode: self.mode,
            aspect_ratio: self.aspect_ratio,
            style: self.style,
            attachments: std::mem::take(&mut self.attachments),
        }
    }

    /// Seeds the buffer with a previously generated image so it can be used
    /// as a reference. Returns false (and changes nothing) for a malformed URL.
    pub fn reuse_image(&mut self, data_url: &str, aspect_ratio: Option<AspectRatio>) -> bool {
        let id = format!("reused-{}", Utc::now().timestamp_millis());
        let Some(attachment) = Attachment::from_data_url(id, data_url) else {
            return false;
        };
        self.attachments = vec![attachment];
        self.mode = Mode::Image;
        if let Some(aspect_ratio) = aspect_ratio {
            self.aspect_ratio = aspect_ratio;
        }
        self.text = REUSE_INSTRUCTION.to_string();
        true
    }
}
