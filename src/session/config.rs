use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Cadence of chunk emission (default: 5 seconds)
    pub chunk_interval: Duration,

    /// Trailing audio retained across chunk boundaries (default: 500ms)
    pub overlap: Duration,

    /// Consecutive failed chunks before the session gives up (default: 3)
    pub max_consecutive_failures: u32,

    /// Bound on the stop-flush of the final chunk; stopping never
    /// blocks longer than this on an in-flight call
    pub stop_flush_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            chunk_interval: Duration::from_millis(5000),
            overlap: Duration::from_millis(500),
            max_consecutive_failures: 3,
            stop_flush_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_interval: config.chunk_interval(),
            overlap: config.overlap(),
            max_consecutive_failures: config.retry.max_consecutive_failures,
            ..Self::default()
        }
    }
}
