use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

/// Microphone capture backend built on cpal.
///
/// The cpal stream is not `Send`, so a dedicated thread owns it for the
/// life of the capture. The audio callback converts incoming buffers to
/// i16 PCM and forwards them over the frame channel without blocking.
/// A stream error drops the sender, closing the channel, which the
/// session reads as device loss.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        self.stop_flag.store(false, Ordering::SeqCst);
        let stop_flag = Arc::clone(&self.stop_flag);
        let capturing = Arc::clone(&self.capturing);
        let target = self.config.clone();

        let thread = std::thread::spawn(move || {
            capture_thread(tx, ready_tx, stop_flag, capturing, target);
        });

        // Wait for the thread to report device acquisition outcome
        ready_rx
            .await
            .map_err(|_| anyhow!("Capture thread exited before opening the device"))??;

        self.thread = Some(thread);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    error!("Capture thread panicked");
                }
            })
            .await?;
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

fn capture_thread(
    tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<()>>,
    stop_flag: Arc<AtomicBool>,
    capturing: Arc<AtomicBool>,
    target: AudioBackendConfig,
) {
    let stream = match open_input_stream(tx, &capturing, &target) {
        Ok(stream) => {
            ready_tx.send(Ok(())).ok();
            stream
        }
        Err(e) => {
            ready_tx.send(Err(e)).ok();
            return;
        }
    };

    capturing.store(true, Ordering::SeqCst);

    while !stop_flag.load(Ordering::SeqCst) && capturing.load(Ordering::SeqCst) {
        std::thread::park_timeout(Duration::from_millis(50));
    }

    capturing.store(false, Ordering::SeqCst);
    drop(stream);
    info!("Microphone capture stopped");
}

fn open_input_stream(
    tx: mpsc::Sender<AudioFrame>,
    capturing: &Arc<AtomicBool>,
    target: &AudioBackendConfig,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No audio input device available"))?;

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let supported = device
        .default_input_config()
        .map_err(|e| anyhow!("Failed to query input config for {}: {}", device_name, e))?;

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let source_rate = stream_config.sample_rate.0;
    let source_channels = stream_config.channels;

    info!(
        "Opening microphone {} ({}Hz, {}ch, {:?})",
        device_name, source_rate, source_channels, sample_format
    );

    let forward = FrameForwarder::new(
        tx,
        source_rate,
        source_channels,
        target.target_sample_rate,
        target.target_channels,
    );

    // The error callback fires on device disappearance; clearing the flag
    // lets the capture thread exit and drop the sender.
    let capturing_for_err = Arc::clone(capturing);
    let on_error = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        capturing_for_err.store(false, Ordering::SeqCst);
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => {
            let mut forward = forward;
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    forward.push(data.to_vec());
                },
                on_error,
                None,
            )?
        }
        cpal::SampleFormat::U16 => {
            let mut forward = forward;
            device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i16> =
                        data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                    forward.push(samples);
                },
                on_error,
                None,
            )?
        }
        cpal::SampleFormat::F32 => {
            let mut forward = forward;
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    forward.push(samples);
                },
                on_error,
                None,
            )?
        }
        other => {
            return Err(anyhow!("Unsupported input sample format: {:?}", other));
        }
    };

    stream
        .play()
        .map_err(|e| anyhow!("Failed to start input stream: {}", e))?;

    Ok(stream)
}

/// Converts raw callback buffers to the target format and forwards them
/// as timestamped frames. Runs entirely inside the audio callback.
struct FrameForwarder {
    tx: mpsc::Sender<AudioFrame>,
    source_rate: u32,
    source_channels: u16,
    target_rate: u32,
    target_channels: u16,
    samples_forwarded: u64,
}

impl FrameForwarder {
    fn new(
        tx: mpsc::Sender<AudioFrame>,
        source_rate: u32,
        source_channels: u16,
        target_rate: u32,
        target_channels: u16,
    ) -> Self {
        Self {
            tx,
            source_rate,
            source_channels,
            target_rate,
            target_channels,
            samples_forwarded: 0,
        }
    }

    fn push(&mut self, samples: Vec<i16>) {
        let mut samples = samples;
        let mut rate = self.source_rate;
        let mut channels = self.source_channels;

        if channels == 2 && self.target_channels == 1 {
            samples = stereo_to_mono(&samples);
            channels = 1;
        }

        if rate > self.target_rate && rate % self.target_rate == 0 {
            let ratio = (rate / self.target_rate) as usize;
            samples = samples.iter().step_by(ratio).copied().collect();
            rate = self.target_rate;
        }

        let timestamp_ms = if rate > 0 {
            self.samples_forwarded * 1000 / (rate as u64 * channels.max(1) as u64)
        } else {
            0
        };
        self.samples_forwarded += samples.len() as u64;

        let frame = AudioFrame {
            samples,
            sample_rate: rate,
            channels,
            timestamp_ms,
        };

        // Never block the audio callback; a full channel drops the frame.
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(frame) {
            warn!("Frame channel full, dropping capture frame");
        }
    }
}

/// Average left/right into one channel
fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| {
            let sum = pair[0] as i32 + pair[1] as i32;
            (sum / 2) as i16
        })
        .collect()
}
