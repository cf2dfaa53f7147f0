mod builder;
mod classifier;
mod keywords;

pub use builder::{
    effective_prompt, reference_generation_prompt, reference_instruction,
    DEFAULT_STYLE_PREFIX, REFERENCE_ANALYSIS_INSTRUCTION,
};
pub use classifier::{
    classify_reference_edit, has_style_keyword, is_image_generation_request, should_intercept,
    ReferenceEdit,
};
