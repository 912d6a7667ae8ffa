//! Recording session management
//!
//! `RecordingSession` owns the capture device for one start→stop
//! lifecycle: it drives the overlap segmenter on a fixed cadence,
//! serializes chunk submission through the transcription client,
//! detects device loss, and reports status, latency, transcript and
//! error events to the presentation layer.

mod config;
mod events;
mod session;

pub use config::SessionConfig;
pub use events::{SessionError, SessionEvent, SessionStatus};
pub use session::RecordingSession;
