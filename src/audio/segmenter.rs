use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::Cursor;
use std::time::Duration;

use super::backend::AudioFrame;

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Segmenter configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Cadence of chunk emission (default: 5s)
    pub chunk_interval: Duration,
    /// Trailing audio retained across chunk boundaries (default: 500ms)
    pub overlap: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_millis(5000),
            overlap: Duration::from_millis(500),
        }
    }
}

/// One bounded span of recorded audio, encoded and ready to submit
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Encoded audio bytes (WAV container)
    pub data: Vec<u8>,
    /// MIME tag for the upload
    pub mime_type: &'static str,
    /// Audio duration covered by this chunk
    pub duration_ms: u64,
    /// Whether this was the flush at session stop
    pub is_final: bool,
}

/// Turns a continuous capture into overlapping chunks.
///
/// Frames accumulate between timer ticks; each emit produces one chunk
/// from everything buffered. After a non-final emit the trailing frames
/// covering at least the overlap window stay buffered, so words spoken
/// across a chunk boundary reappear in the next chunk. The final emit
/// drains everything.
pub struct OverlapSegmenter {
    config: SegmenterConfig,
    frames: VecDeque<AudioFrame>,
}

impl OverlapSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            frames: VecDeque::new(),
        }
    }

    /// Accumulate one capture fragment
    pub fn push_frame(&mut self, frame: AudioFrame) {
        if frame.samples.is_empty() {
            return;
        }
        self.frames.push_back(frame);
    }

    /// Total buffered audio in milliseconds
    pub fn buffered_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.duration_ms()).sum()
    }

    /// Emit one chunk from the buffered audio.
    ///
    /// Returns `None` when nothing has accumulated (the empty tick is
    /// skipped, never submitted). A non-final emit keeps the overlap
    /// tail buffered; a final emit clears the buffer entirely.
    pub fn emit(&mut self, is_final: bool) -> Result<Option<AudioChunk>> {
        if self.frames.is_empty() {
            if is_final {
                self.frames.clear();
            }
            return Ok(None);
        }

        let duration_ms = self.buffered_ms();
        let data = encode_wav(self.frames.iter())?;

        if is_final {
            self.frames.clear();
        } else {
            self.retain_overlap_tail();
        }

        Ok(Some(AudioChunk {
            data,
            mime_type: WAV_MIME_TYPE,
            duration_ms,
            is_final,
        }))
    }

    /// Drop buffered frames from the front until only the trailing
    /// frames covering the overlap window remain.
    fn retain_overlap_tail(&mut self) {
        let overlap_ms = self.config.overlap.as_millis() as u64;
        if overlap_ms == 0 {
            self.frames.clear();
            return;
        }

        let mut tail_ms = 0u64;
        let mut keep = 0usize;
        for frame in self.frames.iter().rev() {
            tail_ms += frame.duration_ms();
            keep += 1;
            if tail_ms >= overlap_ms {
                break;
            }
        }

        while self.frames.len() > keep {
            self.frames.pop_front();
        }
    }
}

/// Encode frames as a single 16-bit PCM WAV buffer
fn encode_wav<'a>(frames: impl Iterator<Item = &'a AudioFrame>) -> Result<Vec<u8>> {
    let mut frames = frames.peekable();
    let first = frames
        .peek()
        .context("Cannot encode an empty chunk")?;

    let spec = hound::WavSpec {
        channels: first.channels,
        sample_rate: first.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;

        for frame in frames {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
        }

        writer.finalize().context("Failed to finalize WAV data")?;
    }

    Ok(cursor.into_inner())
}
