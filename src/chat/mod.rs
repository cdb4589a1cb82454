// Chat loop driver
// Line-oriented multi-turn chat over the engine: slash commands, image
// staging, streaming output, one session log per turn. Generic over its
// input/output streams; terminal handling and argv parsing live elsewhere.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::engine::{tokens_per_sec, Engine, TurnMode, TurnResult};
use crate::session_log::SessionLogWriter;

/// One parsed line of chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Quit,
    Clear,
    Help,
    Image(PathBuf),
    Message(String),
    Empty,
}

impl ChatCommand {
    /// Parse a raw input line. Anything that is not a recognized slash
    /// command is a user message.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ChatCommand::Empty;
        }
        match line {
            "/quit" | "/exit" => return ChatCommand::Quit,
            "/clear" => return ChatCommand::Clear,
            "/help" => return ChatCommand::Help,
            _ => {}
        }
        if let Some(rest) = line.strip_prefix("/image ") {
            return ChatCommand::Image(PathBuf::from(rest.trim()));
        }
        ChatCommand::Message(line.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    /// Print a per-turn stats block after each response.
    pub verbose: bool,
}

const HELP_TEXT: &str = "Commands:\n\
  /image <path>  Load an image for the next message\n\
  /clear         Reset conversation\n\
  /quit          Exit\n";

/// Run the interactive chat loop until `/quit` or end of input.
///
/// Each user message executes one stateful turn, streaming fragments to
/// `output` as they are generated. When a log writer is present, every
/// completed turn is persisted along with the images it consumed.
pub fn run_chat<R: BufRead, W: Write>(
    engine: &mut Engine,
    log_writer: Option<&SessionLogWriter>,
    input: R,
    output: &mut W,
    options: ChatOptions,
) -> Result<()> {
    writeln!(output, "pivision chat (type /quit to exit, /help for commands)\n")?;

    for line in input.lines() {
        let line = line.context("failed to read chat input")?;

        match ChatCommand::parse(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Help => {
                writeln!(output, "{}", HELP_TEXT)?;
            }
            ChatCommand::Clear => {
                engine.clear();
                writeln!(output, "conversation cleared\n")?;
            }
            ChatCommand::Image(path) => {
                if let Err(e) = engine.validate_images(std::slice::from_ref(&path)) {
                    writeln!(output, "error: {}", e)?;
                    continue;
                }
                if !engine.stage_image(&path) {
                    writeln!(output, "failed to load image: {}", path.display())?;
                    continue;
                }
                writeln!(output, "loaded: {}\n", path.display())?;
            }
            ChatCommand::Message(text) => {
                // Snapshot before the turn consumes the staging queue, so
                // the log lists exactly the images this turn evaluated.
                let turn_images = engine.staged_paths();
                let result = {
                    let mut sink = |piece: &str| {
                        let _ = write!(output, "{}", piece);
                        let _ = output.flush();
                    };
                    engine.execute_turn(&text, TurnMode::Stateful, Some(&mut sink))?
                };
                writeln!(output, "\n")?;

                if options.verbose {
                    print_stats(output, &result)?;
                }
                if let Some(writer) = log_writer {
                    if let Err(e) = writer.write_turn(&text, &turn_images, &result) {
                        warn!(error = %e, "failed to save session log");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Per-turn stats block, printed in verbose mode.
pub fn print_stats<W: Write>(out: &mut W, r: &TurnResult) -> Result<()> {
    let prompt_tps = tokens_per_sec(r.prompt_tokens, r.prompt_ms);
    writeln!(
        out,
        "--- stats -----------------------------------------------\n\
         \x20 model:          {}\n\
         \x20 images:         {}\n\
         \x20 prompt tokens:  {}  ({:.1} ms, {:.1} tok/s)\n\
         \x20 gen tokens:     {}  ({:.1} ms, {:.1} tok/s)\n\
         \x20 ttft:           {:.0} ms\n\
         \x20 wall time:      {:.1} s\n\
         ---------------------------------------------------------",
        r.model_desc,
        r.images_processed,
        r.prompt_tokens,
        r.prompt_ms,
        prompt_tps,
        r.gen_tokens,
        r.gen_ms,
        r.tokens_per_sec,
        r.ttft_ms,
        r.wall_ms / 1000.0,
    )?;
    Ok(())
}
