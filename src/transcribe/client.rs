use anyhow::{anyhow, Result};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::AudioChunk;

/// One transcription attempt against the remote STT capability.
///
/// Implementations make exactly one attempt per call; retry lives in
/// `TranscriptionClient`.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<String>;

    /// Transcriber name for logging
    fn name(&self) -> &str;
}

/// Retry policy for chunk submission
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per chunk, including the first
    pub max_attempts: u32,
    /// Base for linear backoff: attempt n sleeps `backoff_base * n`
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
        }
    }
}

/// A chunk exhausted its retry budget; its audio is dropped
#[derive(Debug, Error)]
#[error("Chunk transcription failed after {attempts} attempts: {reason:#}")]
pub struct ChunkTranscriptionError {
    pub attempts: u32,
    pub reason: anyhow::Error,
}

/// Successful transcription of one chunk
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    /// Wall-clock time of the successful attempt only
    pub latency_ms: u64,
}

/// Submits chunks to a `Transcriber` with bounded retry.
///
/// Each chunk gets at most `max_attempts` tries with linear backoff
/// between them. A chunk that exhausts its budget is never submitted
/// again.
pub struct TranscriptionClient {
    transcriber: Box<dyn Transcriber>,
    policy: RetryPolicy,
}

impl TranscriptionClient {
    pub fn new(transcriber: Box<dyn Transcriber>, policy: RetryPolicy) -> Self {
        Self {
            transcriber,
            policy,
        }
    }

    /// Submit one chunk, retrying per the policy
    pub async fn submit(
        &self,
        chunk: &AudioChunk,
    ) -> Result<TranscriptionResult, ChunkTranscriptionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(chunk).await {
                Ok(result) => {
                    info!(
                        "Chunk transcribed via {} ({}ms, attempt {}/{})",
                        self.transcriber.name(),
                        result.latency_ms,
                        attempt,
                        max_attempts
                    );
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        "Transcription attempt {}/{} failed: {:#}",
                        attempt, max_attempts, e
                    );
                    last_error = Some(e);

                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.backoff_base * attempt).await;
                    }
                }
            }
        }

        Err(ChunkTranscriptionError {
            attempts: max_attempts,
            reason: last_error.unwrap_or_else(|| anyhow!("No transcription attempt was made")),
        })
    }

    /// Single best-effort attempt, used for the stop-flush of the final
    /// chunk where no retry loop should gate the caller.
    pub async fn submit_once(&self, chunk: &AudioChunk) -> Result<TranscriptionResult> {
        self.attempt(chunk).await
    }

    async fn attempt(&self, chunk: &AudioChunk) -> Result<TranscriptionResult> {
        let started = tokio::time::Instant::now();
        let text = self.transcriber.transcribe(chunk).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(TranscriptionResult { text, latency_ms })
    }
}
