// Turn results and execution modes

use serde::Serialize;

/// Whether the KV cache and history persist across turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    /// Full reset before every turn; the stored session is never touched.
    Stateless,
    /// Cache and history persist; each turn is evaluated incrementally.
    Stateful,
}

/// Streaming sink: invoked once per generated text fragment, in generation
/// order, synchronously on the executing thread.
pub type StreamSink<'a> = &'a mut dyn FnMut(&str);

/// Everything measured and produced by one conversation turn.
/// Immutable after creation; `total_tokens == prompt_tokens + gen_tokens`.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub content: String,
    pub model_desc: String,
    pub images_processed: u32,
    pub prompt_tokens: u32,
    pub gen_tokens: u32,
    pub total_tokens: u32,
    pub tokens_per_sec: f64,
    pub prompt_ms: f64,
    pub gen_ms: f64,
    pub ttft_ms: f64,
    pub wall_ms: f64,
}

/// Generation throughput in tokens per second, zero when no measurable
/// generation time was recorded.
pub fn tokens_per_sec(gen_tokens: u32, gen_ms: f64) -> f64 {
    if gen_ms <= 0.0 {
        0.0
    } else {
        f64::from(gen_tokens) / (gen_ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_guards_non_positive_time() {
        assert_eq!(tokens_per_sec(100, 0.0), 0.0);
        assert_eq!(tokens_per_sec(100, -5.0), 0.0);
    }

    #[test]
    fn throughput_is_tokens_over_seconds() {
        let tps = tokens_per_sec(50, 2000.0);
        assert!((tps - 25.0).abs() < f64::EPSILON);
    }
}
