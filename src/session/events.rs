use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcribe::ChunkTranscriptionError;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No capture in progress
    Ready,
    /// Device acquired, frames accumulating
    Recording,
    /// A chunk submission (including its retry loop) is in flight;
    /// capture continues underneath
    Transcribing,
    /// The device disappeared mid-session; recoverable via retry
    DeviceLost,
    /// Explicit stop completed, final flush done
    Complete,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Ready => "Ready",
            SessionStatus::Recording => "Recording",
            SessionStatus::Transcribing => "Transcribing",
            SessionStatus::DeviceLost => "DeviceLost",
            SessionStatus::Complete => "Complete",
        };
        f.write_str(name)
    }
}

/// Session-level error taxonomy
#[derive(Debug, Error)]
pub enum SessionError {
    /// Device acquisition denied or unavailable; the start attempt
    /// fails and the session stays Ready
    #[error("Microphone access failed: {0}")]
    DeviceAccess(String),

    /// Device disconnected mid-session; distinct from transcription
    /// failures and recoverable via an explicit retry
    #[error("Microphone disconnected")]
    DeviceLost,

    /// One chunk exhausted its retry budget; non-fatal to the session,
    /// the chunk's audio is dropped
    #[error(transparent)]
    ChunkTranscription(#[from] ChunkTranscriptionError),

    /// Too many consecutive chunk failures; terminal, the session is
    /// forced back to Ready
    #[error("Transcription gave up after {consecutive} consecutive chunk failures")]
    RetryExhausted { consecutive: u32 },
}

/// Notifications delivered to the presentation layer
#[derive(Debug)]
pub enum SessionEvent {
    Status(SessionStatus),
    /// Latency of the most recent successful submission, in milliseconds
    Latency(u64),
    /// Full transcript after applying the most recent result
    Transcript(Vec<String>),
    Error(SessionError),
}
