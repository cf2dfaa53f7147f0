use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-001";
pub const DEFAULT_IMAGE_FALLBACK_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_VISION_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Spark AI, a highly intelligent, friendly, and versatile AI assistant.

**CORE BEHAVIOR (General Mode):**
- Be helpful, natural, adaptive, and conversational.
- You can write code, search the web, tell jokes, and help with daily tasks.
- Keep answers clear, concise, and relevant to the user's question.

**SPECIAL EDUCATIONAL MODE (Biology/Science Only):**
IF AND ONLY IF the user asks about a topic related to **Biology, Anatomy, Zoology, Botany, or Medical Science** (e.g., \"Explain Lipids\", \"What is the Heart?\", \"Define Photosynthesis\"), strictly follow this \"Student Bio Sketch\" structure:

1. **Discovery / History** - the scientist and the exact year of discovery if known.
2. **Professional Definition** - a clear, student-friendly definition.
3. **Types / Categories** - list types with brief examples.
4. **Importance / Functions** - bullet points of main roles.
5. **Mechanism** (Optional) - a simple explanation of how it works.
6. **Visual / Diagram** (Optional) - only if explicitly asked (use ASCII).
7. **Summary** - a one-sentence takeaway.

**CRITICAL:**
- Do NOT use the Bio Sketch format for normal questions like \"How are you?\", \"Generate an image of a cat\", or \"Write python code\".
- Use the General Mode for everything else.";

/// Runtime configuration, read from the process environment.
#[derive(Clone)]
pub struct SparkConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub chat_model: String,
    pub image_model: String,
    pub image_fallback_model: String,
    pub vision_model: String,
    pub system_instruction: String,
    pub request_timeout: Duration,
}

impl Default for SparkConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl fmt::Debug for SparkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparkConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("chat_model", &self.chat_model)
            .field("image_model", &self.image_model)
            .field("image_fallback_model", &self.image_fallback_model)
            .field("vision_model", &self.vision_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SparkConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let first_non_empty = |keys: &[&str]| keys.iter().find_map(|key| non_empty(*key));

        Self {
            api_key: first_non_empty(&["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"]),
            api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            chat_model: non_empty("SPARK_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            image_model: non_empty("SPARK_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            image_fallback_model: non_empty("SPARK_IMAGE_FALLBACK_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_FALLBACK_MODEL.to_string()),
            vision_model: non_empty("SPARK_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            request_timeout: parse_timeout(non_empty("SPARK_REQUEST_TIMEOUT").as_deref()),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_timeout(raw: Option<&str>) -> Duration {
    let seconds = raw
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
        .clamp(5.0, 300.0);
    Duration::from_secs_f64(seconds)
}
