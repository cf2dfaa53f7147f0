use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failures of the image pipeline that are not transport faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("A text prompt is required to generate an image.")]
    EmptyPrompt,
    #[error("No image generated. The prompt might have been blocked by safety filters.")]
    Blocked,
}

/// Text shown in an error bubble: the error chain, de-duplicated and capped.
pub fn user_facing_message(err: &anyhow::Error) -> String {
    let text = error_chain_text(err, 600);
    if text.trim().is_empty() {
        return GENERIC_FAILURE_MESSAGE.to_string();
    }
    text
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
