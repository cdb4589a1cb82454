// Session log protocol
// One file per conversation turn, in a fixed textual layout. The encoder and
// the tolerant decoder here are the durable contract between the engine and
// the offline CSV exporter.

use chrono::NaiveDateTime;
use serde::Serialize;

mod decode;
mod encode;

pub use decode::{decode, decode_file};
pub use encode::{encode, SessionLogWriter};

/// 80-column rule delimiting the log header and footer.
pub const RULE: &str =
    "================================================================================";

pub const LOG_TITLE: &str = "PiVision Session Log";

/// Timestamp format used in the log preamble.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Filename prefix and extension for session log discovery.
pub const FILE_PREFIX: &str = "session_";
pub const FILE_SUFFIX: &str = ".log";

/// Filename for a session log written at `ts`: fixed-width stamp, so
/// lexicographic order is chronological order.
pub fn session_filename(ts: NaiveDateTime) -> String {
    format!("{}{}{}", FILE_PREFIX, ts.format("%Y%m%d_%H%M%S"), FILE_SUFFIX)
}

/// The decoded form of one session log file.
///
/// Produced only by the decoder; read-only; exists only in memory of the
/// export tool. Numeric fields default to zero when a log predates a format
/// change or a field fails to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionRecord {
    pub timestamp: String,
    pub model_description: String,
    pub images_processed: u32,
    pub image_paths: Vec<String>,
    pub prompt: String,
    pub tokens_per_sec: f64,
    pub prompt_tokens: u32,
    pub gen_tokens: u32,
    pub total_tokens: u32,
    pub prompt_ms: f64,
    pub gen_ms: f64,
    pub ttft_ms: f64,
    pub wall_sec: f64,
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn filename_embeds_fixed_width_stamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(session_filename(ts), "session_20240101_120000.log");
    }
}
