// Session log encoder
// Deterministic rendering of one completed turn into the canonical layout.
// All floating metrics carry exactly one fractional digit.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use tracing::debug;

use super::{session_filename, LOG_TITLE, RULE, TIMESTAMP_FORMAT};
use crate::engine::TurnResult;

/// Encode one turn as session-log text.
///
/// Pure function of its inputs; `decode` is its left inverse up to
/// leading/trailing whitespace trimming of the prompt and response.
pub fn encode(
    timestamp: NaiveDateTime,
    image_paths: &[PathBuf],
    prompt: &str,
    result: &TurnResult,
) -> String {
    let mut out = String::with_capacity(512 + prompt.len() + result.content.len());

    // Preamble
    out.push_str(RULE);
    out.push('\n');
    out.push_str(LOG_TITLE);
    out.push('\n');
    let _ = writeln!(out, "Timestamp: {}", timestamp.format(TIMESTAMP_FORMAT));
    out.push_str(RULE);
    out.push_str("\n\n");

    // Model info
    out.push_str("[MODEL]\n");
    let _ = writeln!(out, "Description: {}", result.model_desc);
    let _ = writeln!(out, "Images processed: {}\n", result.images_processed);

    // Images (omitted when none)
    if !image_paths.is_empty() {
        out.push_str("[IMAGES]\n");
        for (i, path) in image_paths.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, path.display());
        }
        out.push('\n');
    }

    // Prompt
    let _ = writeln!(out, "[PROMPT]\n{}\n", prompt);

    // Performance metrics
    out.push_str("[PERFORMANCE]\n");
    let _ = writeln!(out, "Tokens/sec (generation): {:.1}", result.tokens_per_sec);
    let _ = writeln!(out, "Prompt tokens: {}", result.prompt_tokens);
    let _ = writeln!(out, "Generated tokens: {}", result.gen_tokens);
    let _ = writeln!(out, "Total tokens: {}", result.total_tokens);
    let _ = writeln!(out, "Prompt eval time: {:.1} ms", result.prompt_ms);
    let _ = writeln!(out, "Generation time: {:.1} ms", result.gen_ms);
    let _ = writeln!(out, "Time to first token: {:.1} ms", result.ttft_ms);
    let _ = writeln!(out, "Total wall time: {:.1} s\n", result.wall_ms / 1000.0);

    // Response
    let _ = writeln!(out, "[RESPONSE]\n{}\n", result.content);

    out.push_str(RULE);
    out.push('\n');
    out
}

/// Writes one session log file per completed turn into a log directory.
///
/// The directory is an explicit configuration value, threaded in at
/// construction; its resolution (flags, config files, defaults) happens
/// elsewhere.
#[derive(Debug, Clone)]
pub struct SessionLogWriter {
    dir: PathBuf,
}

impl SessionLogWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode and persist one turn. Returns the path written.
    pub fn write_turn(
        &self,
        prompt: &str,
        image_paths: &[PathBuf],
        result: &TurnResult,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create log directory: {}", self.dir.display()))?;

        let now = Local::now().naive_local();
        let path = self.dir.join(session_filename(now));
        fs::write(&path, encode(now, image_paths, prompt, result))
            .with_context(|| format!("failed to write session log: {}", path.display()))?;

        debug!(path = %path.display(), "wrote session log");
        Ok(path)
    }
}
