use super::classifier::{has_style_keyword, ReferenceEdit};
use crate::conversation::ImageStyle;

pub const DEFAULT_STYLE_PREFIX: &str = "Photorealistic image of ";

/// Instruction sent with the reference images to obtain an identity-preserving
/// description.
pub const REFERENCE_ANALYSIS_INSTRUCTION: &str = "Analyze these images in extreme detail.
- If there is a person, describe their face, hair, age, ethnicity, and expression precisely.
- If there is clothing, describe it.
- If there is a background, describe it.

YOUR TASK: Provide a detailed visual description that can be used to recreate this character/scene in an image generator.
Focus on physical traits for identity preservation.";

const REFERENCE_STYLE_SUFFIX: &str = "Style: Photorealistic, High Quality.";

/// Applies the selected style, or the smart photorealistic default when no
/// style is selected and the text names none.
pub fn effective_prompt(text: &str, style: ImageStyle) -> String {
    if !style.is_default() {
        return format!("{text}. Style: {}.", style.value());
    }
    if has_style_keyword(text) {
        return text.to_string();
    }
    format!("{DEFAULT_STYLE_PREFIX}{text}")
}

pub fn reference_instruction(effective: &str, raw: &str, edit: ReferenceEdit) -> String {
    let mut lines = vec![
        format!("TASK: Create a photorealistic image based on this description: \"{effective}\"."),
        String::new(),
        "INTENT:".to_string(),
    ];
    if edit.dress_change {
        lines.push(format!(
            "- The user wants to CHANGE CLOTHING. Keep the character's face/identity but change outfit to: {raw}."
        ));
    }
    if edit.background_change {
        lines.push(format!(
            "- The user wants to CHANGE BACKGROUND. Keep the character's face/body but move them to: {raw}."
        ));
    }
    if edit.merge {
        lines.push("- The user wants to MERGE a character into a scene.".to_string());
    }
    lines.push(String::new());
    lines.push(
        "Note: Detailed visual traits of the reference images will be appended automatically."
            .to_string(),
    );
    lines.join("\n")
}

pub fn reference_generation_prompt(instruction: &str, visual_description: &str) -> String {
    format!(
        "{instruction}\n\nVISUAL REFERENCE DETAILS (Strictly follow these traits):\n{}\n\n{REFERENCE_STYLE_SUFFIX}",
        visual_description.trim()
    )
}
