pub mod audio;
pub mod config;
pub mod session;
pub mod transcribe;
pub mod transcript;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioFile, AudioFrame,
    AudioSource, FileBackend, MicrophoneBackend, OverlapSegmenter, SegmenterConfig, WAV_MIME_TYPE,
};
pub use config::Config;
pub use session::{RecordingSession, SessionConfig, SessionError, SessionEvent, SessionStatus};
pub use transcribe::{
    ChunkTranscriptionError, HttpTranscriber, RetryPolicy, Transcriber, TranscriptionClient,
    TranscriptionResult,
};
pub use transcript::{MergeConfig, MergeOutcome, TranscriptMerger};
