use std::fmt;

use serde::{Deserialize, Serialize};

/// Which orchestration path a send takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Search,
    Image,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Chat, Mode::Search, Mode::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Search => "search",
            Mode::Image => "image",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "chat" | "text" => Some(Mode::Chat),
            "search" | "web" => Some(Mode::Search),
            "image" | "image-generate" | "generate" => Some(Mode::Image),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Classic,
        AspectRatio::Tall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Classic => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "Square",
            AspectRatio::Landscape => "Landscape",
            AspectRatio::Portrait => "Portrait",
            AspectRatio::Classic => "Classic",
            AspectRatio::Tall => "Tall",
        }
    }

    /// Width and height terms of the ratio, e.g. `(16, 9)`.
    pub fn terms(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape => (16, 9),
            AspectRatio::Portrait => (9, 16),
            AspectRatio::Classic => (4, 3),
            AspectRatio::Tall => (3, 4),
        }
    }

    /// Accepts `16:9`, `16/9`, `16x9` or a label such as `landscape`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['/', 'x'], ":")
            .replace(' ', "");
        Self::ALL.into_iter().find(|ratio| {
            ratio.as_str() == normalized || ratio.label().to_ascii_lowercase() == normalized
        })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Style presets offered for image generation. `Default` enables the smart
/// photorealistic prefix instead of an explicit style suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStyle {
    #[default]
    Default,
    Photorealistic,
    Anime,
    Cartoon,
    Render3d,
    OilPainting,
    PencilSketch,
    Cyberpunk,
    Watercolor,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 9] = [
        ImageStyle::Default,
        ImageStyle::Photorealistic,
        ImageStyle::Anime,
        ImageStyle::Cartoon,
        ImageStyle::Render3d,
        ImageStyle::OilPainting,
        ImageStyle::PencilSketch,
        ImageStyle::Cyberpunk,
        ImageStyle::Watercolor,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ImageStyle::Default => "default",
            ImageStyle::Photorealistic => "photorealistic",
            ImageStyle::Anime => "anime",
            ImageStyle::Cartoon => "cartoon",
            ImageStyle::Render3d => "3d",
            ImageStyle::OilPainting => "oil",
            ImageStyle::PencilSketch => "sketch",
            ImageStyle::Cyberpunk => "cyberpunk",
            ImageStyle::Watercolor => "watercolor",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ImageStyle::Default => "Default (Smart)",
            ImageStyle::Photorealistic => "Photorealistic",
            ImageStyle::Anime => "Anime",
            ImageStyle::Cartoon => "Cartoon",
            ImageStyle::Render3d => "3D Render",
            ImageStyle::OilPainting => "Oil Painting",
            ImageStyle::PencilSketch => "Pencil Sketch",
            ImageStyle::Cyberpunk => "Cyberpunk",
            ImageStyle::Watercolor => "Watercolor",
        }
    }

    /// Text appended to the prompt as `Style: {value}.`
    pub fn value(self) -> &'static str {
        match self {
            ImageStyle::Default => "default",
            ImageStyle::Photorealistic => "photorealistic",
            ImageStyle::Anime => "anime style",
            ImageStyle::Cartoon => "cartoon style",
            ImageStyle::Render3d => "3d render, octane render",
            ImageStyle::OilPainting => "oil painting",
            ImageStyle::PencilSketch => "pencil sketch",
            ImageStyle::Cyberpunk => "cyberpunk, neon",
            ImageStyle::Watercolor => "watercolor painting",
        }
    }

    pub fn is_default(self) -> bool {
        self == ImageStyle::Default
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|style| {
            style.key() == normalized
                || style.value() == normalized
                || style.label().to_ascii_lowercase() == normalized
        })
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
