// Conversation engine
// Orchestrates one turn at a time against the inference backend: image
// staging, prompt formatting, evaluation, the sampling loop, and latency
// measurement. Single-writer by design; no internal locking.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, warn};

use crate::backend::{BackendError, Bitmap, ChatMessage, InferenceBackend, Sampled};

pub mod images;
pub mod session;
pub mod turn;

pub use images::{validate, StagedImages, ValidationError};
pub use session::Session;
pub use turn::{tokens_per_sec, StreamSink, TurnMode, TurnResult};

/// Turn-execution engine. Owns the backend, the stateful session, and the
/// image-staging queue.
pub struct Engine {
    backend: Box<dyn InferenceBackend>,
    session: Session,
    staged: StagedImages,
}

impl Engine {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            session: Session::new(),
            staged: StagedImages::new(),
        }
    }

    pub fn model_desc(&self) -> String {
        self.backend.model_desc()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check image paths before staging. Pure: no state is mutated.
    pub fn validate_images(&self, paths: &[PathBuf]) -> Result<(), ValidationError> {
        images::validate(self.backend.supports_vision(), paths)
    }

    /// Decode an image through the backend and stage it for the next turn.
    /// Returns false (without failing) when the backend cannot decode it.
    pub fn stage_image(&mut self, path: &Path) -> bool {
        match self.backend.decode_image(path) {
            Ok(bitmap) => {
                debug!(path = %path.display(), "staged image");
                self.staged.push(path.to_path_buf(), bitmap);
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load image");
                false
            }
        }
    }

    /// Source paths of the currently staged images, in staging order.
    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.staged.paths()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Reset to READY: clear the backend cache and zero the stored session.
    /// The image-staging queue is a separate concern and is left alone.
    pub fn clear(&mut self) {
        self.backend.reset_cache();
        self.session.clear();
    }

    /// Execute one conversation turn.
    ///
    /// Stateless turns reset the cache and run from position zero without
    /// touching the stored session. Stateful turns evaluate incrementally on
    /// top of the session history and append both sides of the exchange to
    /// it. Staged images are consumed by this turn regardless of mode.
    ///
    /// The sink, when present, receives each generated text fragment in
    /// order, synchronously, before the token is fed back into the backend.
    pub fn execute_turn(
        &mut self,
        text: &str,
        mode: TurnMode,
        mut sink: Option<StreamSink<'_>>,
    ) -> Result<TurnResult, BackendError> {
        let wall_start = Instant::now();
        let n_images = self.staged.len();

        // 1. Content assembly: one media-marker line per staged image, then
        //    the raw user text.
        let marker = self.backend.media_marker();
        let mut content = String::with_capacity(text.len() + (marker.len() + 1) * n_images);
        for _ in 0..n_images {
            content.push_str(&marker);
            content.push('\n');
        }
        content.push_str(text);
        let user_msg = ChatMessage::user(content);

        // 2-3. Prompt formatting and state reset.
        let (formatted, cursor, add_bos) = match mode {
            TurnMode::Stateless => {
                let formatted = self.backend.format_prompt(&[], &user_msg, true)?;
                self.backend.reset_cache();
                self.backend.reset_perf();
                (formatted, 0, true)
            }
            TurnMode::Stateful => {
                let is_first = self.session.is_empty();
                let formatted =
                    self.backend
                        .format_prompt(self.session.history(), &user_msg, true)?;
                self.session.push_user(user_msg.content);
                self.backend.reset_perf();
                (formatted, self.session.cursor(), is_first)
            }
        };

        // 4. Evaluation. The staging queue drains here unconditionally;
        //    images are scoped to the turn that evaluates after them.
        let bitmaps: Vec<Bitmap> = self
            .staged
            .drain()
            .into_iter()
            .map(|img| img.bitmap)
            .collect();
        let multimodal = !bitmaps.is_empty() && self.backend.supports_vision();
        let mut cursor = if multimodal {
            self.backend.evaluate(&formatted, &bitmaps, cursor, add_bos)?
        } else {
            self.backend.evaluate(&formatted, &[], cursor, add_bos)?
        };

        // 5. Sampling loop: draw tokens until end of generation, context
        //    exhaustion, or a decode failure (which truncates, not fails).
        let eval_done = Instant::now();
        let mut content = String::new();
        let mut ttft_ms = 0.0;
        let max_tokens = self.backend.context_size().saturating_sub(cursor);

        for _ in 0..max_tokens {
            let token = match self.backend.sample_next() {
                Sampled::EndOfGeneration => break,
                Sampled::Token(token) => token,
            };

            match self.backend.detokenize(token) {
                Ok(piece) => {
                    if !piece.is_empty() {
                        if content.is_empty() {
                            ttft_ms = eval_done.elapsed().as_secs_f64() * 1000.0;
                        }
                        content.push_str(&piece);
                        if let Some(cb) = sink.as_mut() {
                            (**cb)(&piece);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "token decode failed, truncating generation");
                    break;
                }
            }

            if let Err(e) = self.backend.accept_token(token) {
                warn!(error = %e, "cache extension failed, truncating generation");
                break;
            }
            cursor += 1;
        }

        // 6. Completion: snapshot counters, update history in stateful mode.
        let perf = self.backend.perf_snapshot();
        let wall_ms = wall_start.elapsed().as_secs_f64() * 1000.0;

        if mode == TurnMode::Stateful {
            self.session.set_cursor(cursor);
            self.session.push_assistant(content.clone());
        }

        Ok(TurnResult {
            content,
            model_desc: self.backend.model_desc(),
            images_processed: n_images as u32,
            prompt_tokens: perf.prompt_tokens,
            gen_tokens: perf.gen_tokens,
            total_tokens: perf.prompt_tokens + perf.gen_tokens,
            tokens_per_sec: tokens_per_sec(perf.gen_tokens, perf.gen_ms),
            prompt_ms: perf.prompt_ms,
            gen_ms: perf.gen_ms,
            ttft_ms,
            wall_ms,
        })
    }
}
