// Configuration
// pivision.json model and its priority chain: explicit path, local
// directory, user config, system config. The resolved log directory is
// threaded explicitly into the components that need it, never held globally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// System-wide config location, checked last.
const SYSTEM_CONFIG: &str = "/etc/pivision/config.json";

/// Local-directory config, checked after an explicit `--config` path.
const LOCAL_CONFIG: &str = "pivision.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model_path: Option<PathBuf>,
    pub vision_path: Option<PathBuf>,
    pub default_image_path: Option<PathBuf>,
    pub default_n_ctx: Option<usize>,
    pub log_directory: Option<PathBuf>,

    /// Which config file was loaded, for diagnostics.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Parse a single config file.
pub fn load_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: AppConfig = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    config.source = Some(path.to_path_buf());
    Ok(config)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pivision").join("config.json"))
}

/// Load configuration with priority: explicit path, `./pivision.json`,
/// `~/.config/pivision/config.json`, `/etc/pivision/config.json`. A file
/// that exists but fails to parse yields an empty config rather than an
/// error; the chain is not continued past it.
pub fn load(explicit: Option<&Path>) -> AppConfig {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        if path.exists() {
            candidates.push(path.to_path_buf());
        } else {
            warn!(path = %path.display(), "config file not found");
        }
    }
    candidates.push(PathBuf::from(LOCAL_CONFIG));
    if let Some(user) = user_config_path() {
        candidates.push(user);
    }
    candidates.push(PathBuf::from(SYSTEM_CONFIG));

    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        return match load_file(&candidate) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "ignoring unreadable config");
                AppConfig {
                    source: Some(candidate),
                    ..AppConfig::default()
                }
            }
        };
    }

    AppConfig::default()
}

/// Default log directory when nothing else is configured.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("pivision_logs"))
}

/// Resolve the session-log directory: explicit flag, then config, then the
/// `~/pivision_logs` default.
pub fn resolve_log_dir(explicit: Option<PathBuf>, config: &AppConfig) -> Option<PathBuf> {
    explicit
        .or_else(|| config.log_directory.clone())
        .or_else(default_log_dir)
}
