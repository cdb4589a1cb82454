// Session log decoder
// Line-oriented, tolerant parser. Malformed fields degrade silently to their
// defaults; only a file that cannot be read invalidates a record.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Model,
    Images,
    Prompt,
    Performance,
    Response,
    /// Past the closing sentinel; remaining lines are ignored.
    Done,
}

/// Match a `Key: value` line by exact key prefix; the value must be
/// non-empty after trimming.
fn value_for<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.trim().strip_prefix(key)?.strip_prefix(':')?;
    let value = rest.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Strip a trailing unit such as " ms" or " s" and parse; `None` leaves the
/// caller's default in place.
fn parse_metric(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

fn parse_count(value: &str) -> Option<u32> {
    value.split_whitespace().next()?.parse().ok()
}

/// Decode session-log text into a record.
///
/// Never fails: unrecognized lines are ignored and unparseable numeric
/// fields stay zero, by design (best-effort analytics over a log stream
/// that may predate a format change).
pub fn decode(text: &str) -> SessionRecord {
    let mut record = SessionRecord::default();
    let mut section = Section::Preamble;
    let mut prompt_lines: Vec<&str> = Vec::new();
    let mut response_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        // A line equal to a section tag switches sections and resets any
        // in-progress multi-line accumulator.
        match trimmed {
            "[MODEL]" => {
                section = Section::Model;
                continue;
            }
            "[IMAGES]" => {
                section = Section::Images;
                continue;
            }
            "[PROMPT]" => {
                prompt_lines.clear();
                section = Section::Prompt;
                continue;
            }
            "[PERFORMANCE]" => {
                section = Section::Performance;
                continue;
            }
            "[RESPONSE]" => {
                response_lines.clear();
                section = Section::Response;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Preamble => {
                if let Some(value) = trimmed.strip_prefix("Timestamp:") {
                    record.timestamp = value.trim().to_string();
                }
            }
            Section::Model => {
                if let Some(value) = value_for(line, "Description") {
                    record.model_description = value.to_string();
                } else if let Some(value) = value_for(line, "Images processed") {
                    if let Some(n) = parse_count(value) {
                        record.images_processed = n;
                    }
                }
            }
            Section::Images => {
                // Lines like "  1. /path/to/img.png"; blank lines ignored.
                if let Some(dot) = trimmed.find('.') {
                    let path = trimmed[dot + 1..].trim();
                    if !path.is_empty() {
                        record.image_paths.push(path.to_string());
                    }
                }
            }
            Section::Prompt => prompt_lines.push(line),
            Section::Performance => {
                if let Some(v) = value_for(line, "Tokens/sec (generation)") {
                    if let Some(n) = parse_metric(v) {
                        record.tokens_per_sec = n;
                    }
                } else if let Some(v) = value_for(line, "Prompt tokens") {
                    if let Some(n) = parse_count(v) {
                        record.prompt_tokens = n;
                    }
                } else if let Some(v) = value_for(line, "Generated tokens") {
                    if let Some(n) = parse_count(v) {
                        record.gen_tokens = n;
                    }
                } else if let Some(v) = value_for(line, "Total tokens") {
                    if let Some(n) = parse_count(v) {
                        record.total_tokens = n;
                    }
                } else if let Some(v) = value_for(line, "Prompt eval time") {
                    if let Some(n) = parse_metric(v) {
                        record.prompt_ms = n;
                    }
                } else if let Some(v) = value_for(line, "Generation time") {
                    if let Some(n) = parse_metric(v) {
                        record.gen_ms = n;
                    }
                } else if let Some(v) = value_for(line, "Time to first token") {
                    if let Some(n) = parse_metric(v) {
                        record.ttft_ms = n;
                    }
                } else if let Some(v) = value_for(line, "Total wall time") {
                    if let Some(n) = parse_metric(v) {
                        record.wall_sec = n;
                    }
                }
            }
            Section::Response => {
                if trimmed.starts_with("====") {
                    section = Section::Done;
                } else {
                    response_lines.push(line);
                }
            }
            Section::Done => {}
        }
    }

    record.prompt = prompt_lines.join("\n").trim().to_string();
    record.response = response_lines.join("\n").trim().to_string();
    record
}

/// Decode one log file. The only failure mode is an unreadable file.
pub fn decode_file(path: &Path) -> Result<SessionRecord> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read session log: {}", path.display()))?;
    Ok(decode(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TurnResult;
    use crate::session_log::encode;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn sample_result(prompt_tokens: u32, gen_tokens: u32) -> TurnResult {
        TurnResult {
            content: "response body".to_string(),
            model_desc: "scripted 1B alpha".to_string(),
            images_processed: 0,
            prompt_tokens,
            gen_tokens,
            total_tokens: prompt_tokens + gen_tokens,
            tokens_per_sec: 31.3,
            prompt_ms: 120.5,
            gen_ms: 543.2,
            ttft_ms: 87.1,
            wall_ms: 2400.0,
        }
    }

    fn ts() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(9, 30, 45)
            .unwrap()
    }

    #[test]
    fn round_trip_reproduces_every_field() {
        let mut result = sample_result(24, 17);
        result.content = "He said \"look!\"\n\nthen drew a circle, ő küldte.".to_string();
        result.images_processed = 2;
        let images = vec![PathBuf::from("/tmp/a.png"), PathBuf::from("/tmp/b.jpg")];
        let prompt = "first line\n\n  \"quoted\" second line with ünïcode";

        let text = encode(ts(), &images, prompt, &result);
        let record = decode(&text);

        assert_eq!(record.timestamp, "2024-06-15 09:30:45");
        assert_eq!(record.model_description, "scripted 1B alpha");
        assert_eq!(record.images_processed, 2);
        assert_eq!(record.image_paths, vec!["/tmp/a.png", "/tmp/b.jpg"]);
        assert_eq!(record.prompt, prompt.trim());
        assert_eq!(record.response, result.content.trim());
        assert_eq!(record.tokens_per_sec, 31.3);
        assert_eq!(record.prompt_tokens, 24);
        assert_eq!(record.gen_tokens, 17);
        assert_eq!(record.total_tokens, 41);
        assert_eq!(record.prompt_ms, 120.5);
        assert_eq!(record.gen_ms, 543.2);
        assert_eq!(record.ttft_ms, 87.1);
        assert_eq!(record.wall_sec, 2.4);
    }

    #[test]
    fn token_accounting_survives_the_round_trip() {
        let result = sample_result(100, 42);
        let record = decode(&encode(ts(), &[], "count", &result));
        assert_eq!(record.total_tokens, record.prompt_tokens + record.gen_tokens);
    }

    #[test]
    fn malformed_numeric_field_degrades_to_zero() {
        let text = "\
[PERFORMANCE]
Tokens/sec (generation): 12.5
Generation time: abc ms
Prompt tokens: 24
";
        let record = decode(text);
        assert_eq!(record.gen_ms, 0.0);
        // The rest of the record still decodes.
        assert_eq!(record.tokens_per_sec, 12.5);
        assert_eq!(record.prompt_tokens, 24);
    }

    #[test]
    fn unit_suffixes_are_stripped_before_parsing() {
        let text = "\
[PERFORMANCE]
Prompt eval time: 810.0 ms
Total wall time: 2.5 s
";
        let record = decode(text);
        assert_eq!(record.prompt_ms, 810.0);
        assert_eq!(record.wall_sec, 2.5);
    }

    #[test]
    fn missing_images_section_leaves_paths_empty() {
        let record = decode(&encode(ts(), &[], "no images", &sample_result(1, 1)));
        assert!(record.image_paths.is_empty());
        assert_eq!(record.images_processed, 0);
    }

    #[test]
    fn repeated_prompt_tag_resets_the_accumulator() {
        let text = "\
[PROMPT]
old prompt, superseded
[PROMPT]
the real prompt
[PERFORMANCE]
";
        let record = decode(text);
        assert_eq!(record.prompt, "the real prompt");
    }

    #[test]
    fn response_stops_at_the_closing_sentinel() {
        let text = "\
[RESPONSE]
the answer
================================================================================
trailing junk that must be ignored
";
        let record = decode(text);
        assert_eq!(record.response, "the answer");
    }

    #[test]
    fn interior_blank_lines_are_preserved() {
        let result = TurnResult {
            content: "para one\n\npara two".to_string(),
            ..sample_result(1, 1)
        };
        let record = decode(&encode(ts(), &[], "p1\n\np2", &result));
        assert_eq!(record.prompt, "p1\n\np2");
        assert_eq!(record.response, "para one\n\npara two");
    }

    #[test]
    fn unrecognized_model_lines_are_ignored() {
        let text = "\
[MODEL]
Description: tiny model
Quantization: Q4_K_M
Images processed: 3
";
        let record = decode(text);
        assert_eq!(record.model_description, "tiny model");
        assert_eq!(record.images_processed, 3);
    }

    #[test]
    fn decode_file_fails_only_on_unreadable_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("session_20240101_120000.log");
        assert!(decode_file(&missing).is_err());

        let present = dir.path().join("session_20240101_130000.log");
        std::fs::write(&present, "not a session log at all").unwrap();
        let record = decode_file(&present).unwrap();
        assert_eq!(record, SessionRecord::default());
    }
}
