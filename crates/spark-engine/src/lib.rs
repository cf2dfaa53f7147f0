mod config;
mod dryrun;
mod error;
mod fallback;
mod gemini;
mod orchestrator;
mod service;
#[cfg(test)]
mod testing;

pub use config::{SparkConfig, DEFAULT_SYSTEM_INSTRUCTION};
pub use dryrun::DryrunService;
pub use error::{user_facing_message, GenerationError, GENERIC_FAILURE_MESSAGE};
pub use fallback::{attempt_with_fallback, Attempted};
pub use gemini::GeminiService;
pub use orchestrator::{Orchestrator, PendingGeneration, SendOutcome, WELCOME_MESSAGE};
pub use service::{
    ChatSession, ChatTurn, GeneratedImage, GenerativeService, GroundingChunk, TextReply, WebSource,
};
