pub mod backend;
pub mod file;
pub mod microphone;
pub mod segmenter;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use file::{AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
pub use segmenter::{AudioChunk, OverlapSegmenter, SegmenterConfig, WAV_MIME_TYPE};
