use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub merge: MergeSettings,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    /// STT endpoint accepting a multipart audio upload and returning `{"text": ...}`
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioSettings {
    /// Cadence of chunk emission in milliseconds (default: 5000)
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    /// Trailing audio carried into the next chunk (default: 500)
    #[serde(default = "default_overlap_ms")]
    pub overlap_ms: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

#[derive(Debug, Deserialize)]
pub struct RetrySettings {
    /// Attempts per chunk, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base for linear backoff between attempts (default: 1000)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Consecutive failed chunks before the session gives up (default: 3)
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Deserialize)]
pub struct MergeSettings {
    /// Largest word-boundary overlap considered between segments (default: 3)
    #[serde(default = "default_max_overlap_words")]
    pub max_overlap_words: usize,
}

fn default_chunk_interval_ms() -> u64 {
    5000
}

fn default_overlap_ms() -> u64 {
    500
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_max_overlap_words() -> usize {
    3
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            chunk_interval_ms: default_chunk_interval_ms(),
            overlap_ms: default_overlap_ms(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            max_overlap_words: default_max_overlap_words(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.audio.chunk_interval_ms)
    }

    pub fn overlap(&self) -> Duration {
        Duration::from_millis(self.audio.overlap_ms)
    }
}
