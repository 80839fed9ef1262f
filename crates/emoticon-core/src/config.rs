//! Configuration — YAML config + env var overrides.
//!
//! A `Config` is loaded once at startup and handed to each component by value.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var naming the config file (relative to the working directory).
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where content blobs live (content-addressed file names)
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Where records, the name index, the audit log and the journal live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Feature flag for the emoticon commands
    #[serde(default = "default_true")]
    pub emoticon_enabled: bool,

    /// Total download attempts per URL
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extensions kept as-is when they end the URL path
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Substituted for anything not in `allowed_extensions`
    #[serde(default = "default_extension")]
    pub default_extension: String,

    /// Mirror audit history to the log channel
    #[serde(default = "default_true")]
    pub debug_history_to_channel: bool,

    /// Mirror error reports to the log channel
    #[serde(default = "default_true")]
    pub debug_error_to_channel: bool,

    #[serde(default = "default_log_channel")]
    pub debug_history_or_error_channel: String,

    /// Directory holding the config file (set at load time, not serialized from YAML)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("emoticons")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_true() -> bool {
    true
}
fn default_download_attempts() -> u32 {
    3
}
fn default_download_timeout() -> u64 {
    15
}
fn default_user_agent() -> String {
    "emoticon-bot/1.0".into()
}
fn default_allowed_extensions() -> Vec<String> {
    vec![".jpg".into(), ".png".into(), ".gif".into()]
}
fn default_extension() -> String {
    ".jpg".into()
}
fn default_log_channel() -> String {
    "log_channel".into()
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        // Resolve project root from config file location
        let parent = config_path.parent().unwrap_or(Path::new("."));
        config.project_root = parent
            .canonicalize()
            .unwrap_or_else(|_| parent.to_path_buf());

        if let Ok(dir) = std::env::var("EMOTICON_CONTENT_DIR") {
            config.content_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("EMOTICON_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(flag) = std::env::var("EMOTICON_ENABLED") {
            config.emoticon_enabled = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from `$CONFIG_FILE`, falling back to `config.yaml`, under `working_dir`.
    pub fn load_from_env(working_dir: &Path) -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load(&working_dir.join(file))
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_attempts == 0 {
            anyhow::bail!("download_attempts must be at least 1");
        }
        if !self.default_extension.starts_with('.') {
            anyhow::bail!(
                "default_extension must start with '.', got '{}'",
                self.default_extension
            );
        }
        Ok(())
    }

    /// Absolute content directory (relative paths hang off the project root).
    pub fn content_path(&self) -> PathBuf {
        self.resolve(&self.content_dir)
    }

    /// Absolute data directory.
    pub fn data_path(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_root.join(p)
        }
    }

    /// Config rooted at `root` with every other field defaulted. Handy for tests and tools.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            project_root: root.to_path_buf(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            data_dir: default_data_dir(),
            emoticon_enabled: true,
            download_attempts: default_download_attempts(),
            download_timeout_seconds: default_download_timeout(),
            user_agent: default_user_agent(),
            allowed_extensions: default_allowed_extensions(),
            default_extension: default_extension(),
            debug_history_to_channel: true,
            debug_error_to_channel: true,
            debug_history_or_error_channel: default_log_channel(),
            project_root: PathBuf::new(),
        }
    }
}
