use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, StorekeepError};
use crate::poll::PollPolicy;

pub const DEFAULT_CONFIG: &str = "storekeep.toml";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Process-wide settings, resolved once at startup and handed to each client.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_store: Option<String>,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub model: String,
    pub temperature: f64,
    pub poll: PollPolicy,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens_per_chunk")]
    pub max_tokens_per_chunk: u32,
    #[serde(default = "default_max_overlap_tokens")]
    pub max_overlap_tokens: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: default_max_tokens_per_chunk(),
            max_overlap_tokens: default_max_overlap_tokens(),
        }
    }
}

fn default_max_tokens_per_chunk() -> u32 {
    200
}

fn default_max_overlap_tokens() -> u32 {
    20
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub max_upload_mb: Option<usize>,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub ask: AskSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeminiSection {
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AskSection {
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollSection {
    pub interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl AppConfig {
    /// Reads `STOREKEEP_CONFIG` (or `storekeep.toml`) and the process environment.
    pub fn from_env() -> Result<Self> {
        let path = env::var("STOREKEEP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
        Self::load(Path::new(&path))
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        let file = load_file_config(config_path)?;
        Self::from_lookup(file, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let api_key = var("GEMINI_API_KEY")
            .ok_or_else(|| StorekeepError::Config("GEMINI_API_KEY is not set".to_string()))?;
        let base_url = var("GEMINI_BASE_URL")
            .or(file.gemini.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let data_dir = var("STOREKEEP_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));
        let upload_dir = var("STOREKEEP_UPLOAD_DIR")
            .map(PathBuf::from)
            .or(file.upload_dir)
            .unwrap_or_else(|| PathBuf::from("uploads"));
        let bind_addr = var("BIND_ADDR")
            .or_else(|| var("PORT").map(|port| format!("0.0.0.0:{port}")))
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let defaults = PollPolicy::default();
        let poll = PollPolicy::new(
            file.poll
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            file.poll.max_attempts.unwrap_or(defaults.max_attempts),
        );
        let max_upload_mb = file.max_upload_mb.unwrap_or(100);
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            StorekeepError::Config(format!("max_upload_mb is too large: {max_upload_mb}"))
        })?;
        Ok(Self {
            api_key,
            base_url,
            default_store: var("GEMINI_FILE_SEARCH_STORE"),
            data_dir,
            upload_dir,
            bind_addr,
            max_upload_bytes,
            model: file.ask.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: file.ask.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            poll,
            chunking: file.chunking,
        })
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}
