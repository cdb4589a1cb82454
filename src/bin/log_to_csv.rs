// log_to_csv - Export PiVision session logs to CSV
// Standalone analytics tool: scans the log directory, decodes each session
// log, and writes one CSV row per session. No backend dependency.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use pivision::{config, export};

#[derive(Parser, Debug)]
#[command(
    name = "log_to_csv",
    version,
    about = "Scrape PiVision session logs from the log directory and write a CSV"
)]
struct Args {
    /// Log directory (default: from config or ~/pivision_logs)
    #[arg(long, short = 'l')]
    log_dir: Option<PathBuf>,

    /// Config file to read log_directory from
    #[arg(long, short = 'C')]
    config: Option<PathBuf>,

    /// Output CSV path (default: <log-dir>/pivision_sessions.csv)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let file_config = config::load(args.config.as_deref());
    let Some(log_dir) = config::resolve_log_dir(args.log_dir, &file_config) else {
        bail!(
            "could not determine log directory; pass --log-dir or set \
             log_directory in the config"
        );
    };

    if !log_dir.is_dir() {
        bail!(
            "log directory does not exist or is not a directory: {}",
            log_dir.display()
        );
    }

    let output = args
        .output
        .unwrap_or_else(|| log_dir.join(export::DEFAULT_OUTPUT_NAME));

    let count = export::export_directory(&log_dir, &output)?;
    eprintln!("Wrote {} session(s) to {}", count, output.display());
    Ok(())
}
