use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediakit_session::SessionConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory graphs, no real decoding.
    #[default]
    Null,
    /// GStreamer graphs (requires the `gst` feature).
    Gst,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "null" => Some(Self::Null),
            "gst" | "gstreamer" => Some(Self::Gst),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    /// How long to wait for a capture to be written.
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
            capture_timeout_secs: default_capture_timeout_secs(),
        }
    }
}

fn default_log_filter() -> String {
    "mediakit=info".to_string()
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_capture_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{path}'"))?;
            toml::from_str(&content).with_context(|| format!("invalid config file '{path}'"))?
        } else {
            tracing::info!("Config file not found at '{}', using defaults", path);
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment variable overrides, looked up through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("MEDIAKIT_BACKEND") {
            match BackendKind::parse(&value) {
                Some(kind) => self.backend = kind,
                None => tracing::warn!(
                    "Ignoring invalid MEDIAKIT_BACKEND value '{}'; expected null or gst",
                    value
                ),
            }
        }
        if let Some(value) = lookup("MEDIAKIT_LOG") {
            self.log.filter = value;
        }
        if let Some(value) = lookup("MEDIAKIT_STATE_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(parsed) => self.session.state_change_timeout_ms = parsed,
                Err(_) => tracing::warn!(
                    "Ignoring invalid MEDIAKIT_STATE_TIMEOUT_MS value '{}'",
                    value
                ),
            }
        }
    }

    /// Where a snapshot named `name` is written.
    pub fn snapshot_path(&self, name: &Path) -> PathBuf {
        self.camera.snapshot_dir.join(name)
    }
}
