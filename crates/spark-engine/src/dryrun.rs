use std::io::Cursor;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use spark_contracts::conversation::{AspectRatio, Attachment};

use crate::service::{
    ChatSession, GeneratedImage, GenerativeService, GroundingChunk, TextReply, WebSource,
};

const DRYRUN_LONG_SIDE: u32 = 512;

/// Offline stand-in for the remote API. Replies are deterministic in their
/// input, so a whole conversation can be exercised without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunService;

impl DryrunService {
    pub fn new() -> Self {
        Self
    }
}

impl GenerativeService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn create_session(&self, model: &str, system_instruction: &str) -> Result<ChatSession> {
        if model.trim().is_empty() {
            bail!("chat session requires a model");
        }
        Ok(ChatSession::new(model, system_instruction))
    }

    fn send_to_session(&self, session: &mut ChatSession, text: &str) -> Result<TextReply> {
        let reply = format!("[dryrun:{}] {}", session.model, text.trim());
        session.record_exchange(text, &reply);
        Ok(TextReply::text(reply))
    }

    fn complete_with_search(&self, model: &str, text: &str) -> Result<TextReply> {
        let query = text.trim();
        Ok(TextReply {
            text: format!("[dryrun:{model}] No live search results for \"{query}\"."),
            grounding_chunks: vec![GroundingChunk {
                web: Some(WebSource {
                    title: Some(format!("Dryrun result for {query}")),
                    uri: Some(format!(
                        "https://dryrun.invalid/search/{}",
                        short_id(query, 0)
                    )),
                }),
            }],
        })
    }

    fn complete_vision(&self, model: &str, text: &str, images: &[Attachment]) -> Result<String> {
        if images.is_empty() {
            bail!("vision request requires at least one image");
        }
        let noun = if images.len() == 1 { "image" } else { "images" };
        Ok(format!(
            "[dryrun:{model}] Description of {} reference {noun} for: {}",
            images.len(),
            first_line(text)
        ))
    }

    fn generate_image(
        &self,
        _model: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<GeneratedImage>> {
        let (width, height) = dryrun_dimensions(aspect_ratio);
        let bytes = render_dryrun_png(width, height, prompt)?;
        Ok(Some(GeneratedImage {
            mime_type: "image/png".to_string(),
            data: BASE64.encode(bytes),
        }))
    }
}

fn dryrun_dimensions(aspect_ratio: AspectRatio) -> (u32, u32) {
    let (w, h) = aspect_ratio.terms();
    if w >= h {
        (DRYRUN_LONG_SIDE, DRYRUN_LONG_SIDE * h / w)
    } else {
        (DRYRUN_LONG_SIDE * w / h, DRYRUN_LONG_SIDE)
    }
}

fn render_dryrun_png(width: u32, height: u32, prompt: &str) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(prompt);
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode dryrun image")?;
    Ok(out.into_inner())
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(text: &str, idx: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}
