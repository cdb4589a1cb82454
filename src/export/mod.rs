// CSV exporter
// Flattens decoded session records into one tabular file. The wire format is
// fixed: string columns are always quote-wrapped (internal quotes doubled,
// carriage returns stripped, line feeds kept), numeric columns unquoted.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::session_log::{self, SessionRecord, FILE_PREFIX, FILE_SUFFIX};

/// Header row, 14 fixed column names.
pub const CSV_HEADER: &str = "timestamp,model_description,images_processed,image_paths,prompt,\
tokens_per_sec,prompt_tokens,gen_tokens,total_tokens,\
prompt_ms,gen_ms,ttft_ms,wall_sec,response";

/// Default output filename inside the log directory.
pub const DEFAULT_OUTPUT_NAME: &str = "pivision_sessions.csv";

/// Escape a CSV field: wrap in quotes, double internal quotes, drop CRs.
/// Embedded line feeds stay, giving a conformant multi-line field.
fn csv_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_row<W: Write>(out: &mut W, r: &SessionRecord) -> io::Result<()> {
    writeln!(
        out,
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        csv_escape(&r.timestamp),
        csv_escape(&r.model_description),
        r.images_processed,
        csv_escape(&r.image_paths.join("; ")),
        csv_escape(&r.prompt),
        r.tokens_per_sec,
        r.prompt_tokens,
        r.gen_tokens,
        r.total_tokens,
        r.prompt_ms,
        r.gen_ms,
        r.ttft_ms,
        r.wall_sec,
        csv_escape(&r.response),
    )
}

/// Write the header row and one row per record, in order.
pub fn write_csv<W: Write>(out: &mut W, records: &[SessionRecord]) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for record in records {
        write_row(out, record)?;
    }
    Ok(())
}

/// Find session logs in a directory: regular files named
/// `session_*.log`, sorted lexicographically (= chronologically, since the
/// filename embeds a fixed-width timestamp).
pub fn collect_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Decode every session log in `log_dir` and write the CSV to `output`.
/// Unreadable files are logged and skipped; they never fail the batch.
/// Returns the number of exported rows.
pub fn export_directory(log_dir: &Path, output: &Path) -> Result<usize> {
    let files = collect_log_files(log_dir)?;

    let mut records = Vec::with_capacity(files.len());
    for path in &files {
        match session_log::decode_file(path) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping session log"),
        }
    }

    let file = File::create(output)
        .with_context(|| format!("cannot open output file: {}", output.display()))?;
    let mut out = BufWriter::new(file);
    write_csv(&mut out, &records)?;
    out.flush()?;

    info!(
        rows = records.len(),
        output = %output.display(),
        "exported session logs"
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(timestamp: &str, prompt: &str, response: &str) -> SessionRecord {
        SessionRecord {
            timestamp: timestamp.to_string(),
            model_description: "scripted 1B alpha".to_string(),
            images_processed: 1,
            image_paths: vec!["/tmp/a.png".to_string()],
            prompt: prompt.to_string(),
            tokens_per_sec: 12.5,
            prompt_tokens: 10,
            gen_tokens: 5,
            total_tokens: 15,
            prompt_ms: 100.0,
            gen_ms: 400.0,
            ttft_ms: 50.0,
            wall_sec: 1.2,
            response: response.to_string(),
        }
    }

    #[test]
    fn escaping_doubles_quotes_and_strips_carriage_returns() {
        assert_eq!(csv_escape("plain"), "\"plain\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("a\r\nb"), "\"a\nb\"");
    }

    #[test]
    fn strings_are_quoted_and_numbers_are_not() {
        let mut out = Vec::new();
        write_csv(&mut out, &[record("2024-01-01 12:00:00", "ask", "answer")]).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);
        assert_eq!(
            lines.next().unwrap(),
            "\"2024-01-01 12:00:00\",\"scripted 1B alpha\",1,\"/tmp/a.png\",\"ask\",\
             12.5,10,5,15,100,400,50,1.2,\"answer\""
        );
    }

    #[test]
    fn output_parses_as_rfc4180_with_multiline_fields() {
        let mut out = Vec::new();
        write_csv(
            &mut out,
            &[record(
                "2024-01-01 12:00:00",
                "line one\nline two",
                "it said \"ok\"",
            )],
        )
        .unwrap();

        let mut reader = csv::ReaderBuilder::new().from_reader(out.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 14);
        assert_eq!(&headers[0], "timestamp");
        assert_eq!(&headers[13], "response");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][4], "line one\nline two");
        assert_eq!(&rows[0][13], "it said \"ok\"");
    }

    #[test]
    fn discovery_filters_and_sorts_by_filename() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("session_20240101_130000.log"), "later").unwrap();
        fs::write(dir.path().join("session_20240101_120000.log"), "earlier").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a log").unwrap();
        fs::write(dir.path().join("session_backup.csv"), "wrong suffix").unwrap();
        fs::create_dir(dir.path().join("session_dir.log")).unwrap();

        let files = collect_log_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "session_20240101_120000.log",
                "session_20240101_130000.log"
            ]
        );
    }

    #[test]
    fn export_writes_one_row_per_log_in_filename_order() {
        let dir = TempDir::new().unwrap();
        for (name, desc) in [
            ("session_20240101_120000.log", "first"),
            ("session_20240101_130000.log", "second"),
        ] {
            fs::write(
                dir.path().join(name),
                format!("[MODEL]\nDescription: {}\n", desc),
            )
            .unwrap();
        }

        let output = dir.path().join(DEFAULT_OUTPUT_NAME);
        let count = export_directory(dir.path(), &output).unwrap();
        assert_eq!(count, 2);

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains("\"first\""));
        assert!(lines[2].contains("\"second\""));
    }
}
