// Inference backend capability
// Opaque interface to the model runtime (loading, tokenization, evaluation,
// sampling). The engine never touches runtime handles directly; a concrete
// backend owns them and releases them on Drop.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod scripted;

pub use scripted::ScriptedBackend;

/// Token id, as produced by the backend's sampler.
pub type Token = i32;

/// Errors reported by the inference backend.
///
/// All of these are fatal to the operation that raised them except
/// `TokenDecode`, which the turn executor recovers from by truncating
/// generation early.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to load vision projector: {0}")]
    ProjectorLoad(String),

    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    #[error("prompt formatting failed: {0}")]
    Format(String),

    #[error("tokenize/evaluate failed: {0}")]
    Evaluate(String),

    #[error("failed to decode token {0} to text")]
    TokenDecode(Token),
}

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message, as handed to the backend's prompt formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A decoded image bitmap, produced by the backend's image decoder and
/// consumed by multimodal evaluation. Opaque to the engine beyond its size.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Outcome of drawing one token from the sampler chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampled {
    Token(Token),
    EndOfGeneration,
}

/// Sampler chain configuration, applied at backend construction:
/// top-k -> top-p -> temperature -> seeded categorical draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerOptions {
    pub top_k: i32,
    pub top_p: f32,
    pub temperature: f32,
    pub seed: u32,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.8,
            seed: 42,
        }
    }
}

/// Performance counters snapshotted from the backend after a turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfSnapshot {
    pub prompt_tokens: u32,
    pub gen_tokens: u32,
    pub prompt_ms: f64,
    pub gen_ms: f64,
}

/// Capability interface to the model runtime.
///
/// One turn drives this as: `format_prompt` -> `evaluate` -> repeated
/// `sample_next` / `detokenize` / `accept_token` until end of generation.
/// The cursor passed to `evaluate` is the count of positions already in the
/// attention cache; each call returns the advanced cursor, and each accepted
/// token extends the cache by one more position.
pub trait InferenceBackend {
    /// Human-readable model description, cached at load time.
    fn model_desc(&self) -> String;

    /// Context window size in token positions.
    fn context_size(&self) -> usize;

    /// Whether a vision projector is loaded.
    fn supports_vision(&self) -> bool;

    /// Reserved marker string signalling "an image occupies this position"
    /// to the multimodal tokenizer. Empty when vision is not supported.
    fn media_marker(&self) -> String;

    /// Apply the model's chat template. With an empty history and
    /// `add_generation_prompt` this formats a full single-shot conversation;
    /// with prior history it formats only the incremental turn.
    fn format_prompt(
        &self,
        history: &[ChatMessage],
        message: &ChatMessage,
        add_generation_prompt: bool,
    ) -> Result<String, BackendError>;

    /// Decode an image file into a bitmap for multimodal evaluation.
    fn decode_image(&mut self, path: &Path) -> Result<Bitmap, BackendError>;

    /// Tokenize `text` (jointly with `images` when non-empty) and evaluate
    /// the result starting at `cursor`. Returns the advanced cursor.
    fn evaluate(
        &mut self,
        text: &str,
        images: &[Bitmap],
        cursor: usize,
        add_bos: bool,
    ) -> Result<usize, BackendError>;

    /// Draw one token from the sampler chain.
    fn sample_next(&mut self) -> Sampled;

    /// Detokenize a sampled token to a text fragment.
    fn detokenize(&mut self, token: Token) -> Result<String, BackendError>;

    /// Feed a sampled token back into the model, extending the cache by one
    /// position.
    fn accept_token(&mut self, token: Token) -> Result<(), BackendError>;

    /// Clear the attention cache (KV cache) entirely.
    fn reset_cache(&mut self);

    /// Reset the performance counters without touching the cache.
    fn reset_perf(&mut self);

    /// Snapshot the performance counters accumulated since the last reset.
    fn perf_snapshot(&self) -> PerfSnapshot;
}
