//! Transcription client
//!
//! `Transcriber` is one attempt against the remote STT capability;
//! `TranscriptionClient` layers the bounded retry/backoff policy and
//! latency reporting on top. `HttpTranscriber` is the multipart-HTTP
//! implementation.

mod client;
mod http;

pub use client::{
    ChunkTranscriptionError, RetryPolicy, Transcriber, TranscriptionClient, TranscriptionResult,
};
pub use http::HttpTranscriber;
