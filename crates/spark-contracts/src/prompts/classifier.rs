use super::keywords::{
    BACKGROUND_CHANGE_KEYWORDS, DRESS_CHANGE_KEYWORDS, IMAGE_INTENT_KEYWORDS, MERGE_KEYWORDS,
    STYLE_KEYWORDS,
};
use crate::conversation::Mode;

/// What a reference-image edit asks for. Flags are independent except that
/// `background_change` is never set together with `dress_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceEdit {
    pub dress_change: bool,
    pub background_change: bool,
    pub merge: bool,
}

impl ReferenceEdit {
    pub fn is_empty(&self) -> bool {
        !self.dress_change && !self.background_change && !self.merge
    }
}

pub fn is_image_generation_request(text: &str) -> bool {
    contains_any(&text.to_lowercase(), IMAGE_INTENT_KEYWORDS)
}

pub fn has_style_keyword(text: &str) -> bool {
    contains_any(&text.to_lowercase(), STYLE_KEYWORDS)
}

/// A plain chat message that reads like an image request is held back until
/// the user picks an aspect ratio.
pub fn should_intercept(text: &str, mode: Mode, attachment_count: usize) -> bool {
    mode == Mode::Chat && attachment_count == 0 && is_image_generation_request(text)
}

pub fn classify_reference_edit(text: &str, attachment_count: usize) -> ReferenceEdit {
    let lower = text.to_lowercase();
    let dress_change = contains_any(&lower, DRESS_CHANGE_KEYWORDS);
    let background_change = !dress_change && contains_any(&lower, BACKGROUND_CHANGE_KEYWORDS);
    let merge = attachment_count > 1 || contains_any(&lower, MERGE_KEYWORDS);
    ReferenceEdit {
        dress_change,
        background_change,
        merge,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
