// Scripted inference backend
// Deterministic, in-memory implementation of the backend capability.
// Replays canned reply fragments; used by the test suite and for exercising
// the session-log/export pipeline without a model runtime.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use super::{
    Bitmap, BackendError, ChatMessage, InferenceBackend, PerfSnapshot, Sampled, Token,
};

/// Default media marker, matching the multimodal tokenizer convention.
const MEDIA_MARKER: &str = "<__media__>";

/// Token positions charged per image during multimodal evaluation.
const TOKENS_PER_IMAGE: usize = 16;

/// One recorded `evaluate` call.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub text: String,
    pub n_images: usize,
    pub cursor: usize,
    pub add_bos: bool,
}

/// Observable trace of backend calls, shared with tests via `trace()`.
#[derive(Debug, Default)]
pub struct Trace {
    pub evaluations: Vec<Evaluation>,
    pub cache_resets: usize,
    pub perf_resets: usize,
}

pub struct ScriptedBackend {
    replies: VecDeque<VecDeque<String>>,
    active: VecDeque<String>,
    pending: HashMap<Token, String>,
    next_token: Token,

    vision: bool,
    context_size: usize,
    fail_image_decode: bool,
    fail_detokenize_after: Option<usize>,
    decoded_pieces: usize,

    cache_len: usize,
    prompt_tokens: u32,
    gen_tokens: u32,

    trace: Rc<RefCell<Trace>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: VecDeque::new(),
            active: VecDeque::new(),
            pending: HashMap::new(),
            next_token: 0,
            vision: false,
            context_size: 4096,
            fail_image_decode: false,
            fail_detokenize_after: None,
            decoded_pieces: 0,
            cache_len: 0,
            prompt_tokens: 0,
            gen_tokens: 0,
            trace: Rc::new(RefCell::new(Trace::default())),
        }
    }

    /// Queue one reply, delivered fragment by fragment on the next turn.
    pub fn with_reply<I, S>(mut self, pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .push_back(pieces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_context_size(mut self, context_size: usize) -> Self {
        self.context_size = context_size;
        self
    }

    /// Make `decode_image` fail, to exercise the stage() failure path.
    pub fn with_failing_image_decode(mut self) -> Self {
        self.fail_image_decode = true;
        self
    }

    /// Fail `detokenize` after `n` successfully decoded fragments, to
    /// exercise mid-generation truncation.
    pub fn with_detokenize_failure_after(mut self, n: usize) -> Self {
        self.fail_detokenize_after = Some(n);
        self
    }

    /// Handle to the recorded call trace.
    pub fn trace(&self) -> Rc<RefCell<Trace>> {
        Rc::clone(&self.trace)
    }

    fn count_text_tokens(text: &str) -> usize {
        // One position per whitespace-separated piece; never zero for
        // non-empty text so evaluation always advances the cursor.
        let n = text.split_whitespace().count();
        if n == 0 && !text.is_empty() {
            1
        } else {
            n
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn model_desc(&self) -> String {
        "scripted 1B alpha".to_string()
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn media_marker(&self) -> String {
        if self.vision {
            MEDIA_MARKER.to_string()
        } else {
            String::new()
        }
    }

    fn format_prompt(
        &self,
        history: &[ChatMessage],
        message: &ChatMessage,
        add_generation_prompt: bool,
    ) -> Result<String, BackendError> {
        // Fixed template in the shape of a chat-template expansion; real
        // backends substitute the model's own template here.
        let mut out = String::new();
        if history.is_empty() {
            out.push_str("<|begin|>\n");
        }
        out.push_str(&format!(
            "<|{}|>\n{}\n",
            message.role.as_str(),
            message.content
        ));
        if add_generation_prompt {
            out.push_str("<|assistant|>\n");
        }
        Ok(out)
    }

    fn decode_image(&mut self, path: &Path) -> Result<Bitmap, BackendError> {
        if !self.vision {
            return Err(BackendError::ProjectorLoad(
                "no vision projector loaded".to_string(),
            ));
        }
        if self.fail_image_decode {
            return Err(BackendError::ImageDecode(path.display().to_string()));
        }
        let data = std::fs::read(path)
            .map_err(|e| BackendError::ImageDecode(format!("{}: {}", path.display(), e)))?;
        Ok(Bitmap {
            width: 1,
            height: 1,
            data,
        })
    }

    fn evaluate(
        &mut self,
        text: &str,
        images: &[Bitmap],
        cursor: usize,
        add_bos: bool,
    ) -> Result<usize, BackendError> {
        let n_tokens = Self::count_text_tokens(text) + images.len() * TOKENS_PER_IMAGE;
        self.trace.borrow_mut().evaluations.push(Evaluation {
            text: text.to_string(),
            n_images: images.len(),
            cursor,
            add_bos,
        });

        self.prompt_tokens += n_tokens as u32;
        self.cache_len = cursor + n_tokens;

        // Arm the next scripted reply for the sampling loop.
        self.active = self.replies.pop_front().unwrap_or_default();

        Ok(self.cache_len)
    }

    fn sample_next(&mut self) -> Sampled {
        match self.active.pop_front() {
            Some(piece) => {
                let token = self.next_token;
                self.next_token += 1;
                self.pending.insert(token, piece);
                Sampled::Token(token)
            }
            None => Sampled::EndOfGeneration,
        }
    }

    fn detokenize(&mut self, token: Token) -> Result<String, BackendError> {
        if let Some(limit) = self.fail_detokenize_after {
            if self.decoded_pieces >= limit {
                return Err(BackendError::TokenDecode(token));
            }
        }
        let piece = self
            .pending
            .remove(&token)
            .ok_or(BackendError::TokenDecode(token))?;
        self.decoded_pieces += 1;
        Ok(piece)
    }

    fn accept_token(&mut self, _token: Token) -> Result<(), BackendError> {
        self.cache_len += 1;
        self.gen_tokens += 1;
        Ok(())
    }

    fn reset_cache(&mut self) {
        self.cache_len = 0;
        self.trace.borrow_mut().cache_resets += 1;
    }

    fn reset_perf(&mut self) {
        self.prompt_tokens = 0;
        self.gen_tokens = 0;
        self.trace.borrow_mut().perf_resets += 1;
    }

    fn perf_snapshot(&self) -> PerfSnapshot {
        // Synthetic timings, proportional to the token counts so throughput
        // figures are non-zero and self-consistent.
        PerfSnapshot {
            prompt_tokens: self.prompt_tokens,
            gen_tokens: self.gen_tokens,
            prompt_ms: f64::from(self.prompt_tokens) * 2.0,
            gen_ms: f64::from(self.gen_tokens) * 4.0,
        }
    }
}
