//! Configuration persistence for Newsreel
//!
//! A simple key=value file in the user's config directory. The speech API
//! key may also come from the environment.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `speech_api_key`
pub const API_KEY_ENV: &str = "NEWSREEL_SPEECH_API_KEY";

const DEFAULT_METADATA_TIMEOUT_MS: u64 = 5000;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where the record database and blobs live
    pub data_dir: PathBuf,
    pub speech_endpoint: Option<String>,
    pub speech_api_key: Option<String>,
    pub default_voice_id: Option<String>,
    /// Base URL uploaded blobs are served from
    pub public_base_url: Option<String>,
    /// Start audio contexts suspended until playback begins
    pub start_suspended: bool,
    pub metadata_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("newsreel"),
            speech_endpoint: None,
            speech_api_key: None,
            default_voice_id: None,
            public_base_url: None,
            start_suspended: true,
            metadata_timeout_ms: DEFAULT_METADATA_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load config from the default location, then apply the environment
    ///
    /// Returns default config if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        let mut config = Self::load_from(&path).unwrap_or_default();
        config.apply_env(std::env::var(API_KEY_ENV).ok());
        config
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("newsreel")
            .join("config.txt")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("stories.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    fn apply_env(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.speech_api_key = Some(key.trim().to_string());
        }
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let text = (!value.is_empty()).then(|| value.to_string());

            match key.trim() {
                "data_dir" => {
                    if !value.is_empty() {
                        config.data_dir = PathBuf::from(value);
                    }
                }
                "speech_endpoint" => config.speech_endpoint = text,
                "speech_api_key" => config.speech_api_key = text,
                "default_voice_id" => config.default_voice_id = text,
                "public_base_url" => config.public_base_url = text,
                "start_suspended" => {
                    if let Ok(flag) = value.parse() {
                        config.start_suspended = flag;
                    }
                }
                "metadata_timeout_ms" => {
                    if let Ok(ms) = value.parse() {
                        config.metadata_timeout_ms = ms;
                    }
                }
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec!["# Newsreel Configuration".to_string()];
        lines.push(format!("data_dir={}", self.data_dir.display()));

        let optional = [
            ("speech_endpoint", &self.speech_endpoint),
            ("speech_api_key", &self.speech_api_key),
            ("default_voice_id", &self.default_voice_id),
            ("public_base_url", &self.public_base_url),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                lines.push(format!("{key}={value}"));
            }
        }

        lines.push(format!("start_suspended={}", self.start_suspended));
        lines.push(format!("metadata_timeout_ms={}", self.metadata_timeout_ms));
        lines.join("\n")
    }
}
