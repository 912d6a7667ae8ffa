use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{SessionError, SessionEvent, SessionStatus};
use crate::audio::{AudioBackend, AudioFrame, OverlapSegmenter, SegmenterConfig};
use crate::transcribe::TranscriptionClient;
use crate::transcript::{MergeConfig, TranscriptMerger};

/// A recording session that owns the capture device, drives the
/// overlap segmenter on a fixed cadence, submits chunks through the
/// transcription client one at a time, and folds results into the
/// transcript.
///
/// One start→stop lifecycle per session; the device handle and the
/// audio buffer are exclusively owned here. All results apply in
/// submission order because submission is never parallelized.
pub struct RecordingSession {
    inner: Arc<Inner>,
    pipeline_task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: SessionConfig,
    backend: Mutex<Box<dyn AudioBackend>>,
    client: TranscriptionClient,
    merger: Mutex<TranscriptMerger>,
    events_tx: mpsc::Sender<SessionEvent>,
    status: StdMutex<SessionStatus>,
    started_at: StdMutex<Option<chrono::DateTime<chrono::Utc>>>,

    /// True between a successful start and the pipeline winding down
    is_recording: AtomicBool,
    /// Set by stop(); distinguishes an intentional capture end from
    /// device loss when the frame channel closes
    stop_requested: AtomicBool,
    /// Single-flight guard: a tick firing while set skips its emission
    in_flight: AtomicBool,
    /// Reset on every success; reaching the ceiling ends the session
    consecutive_failures: AtomicU32,
    /// Set on device loss; cleared by a successful retry
    device_lost: AtomicBool,
    /// Wakes the pipeline for stop or forced shutdown
    shutdown: Notify,
}

impl RecordingSession {
    /// Create a session around a capture backend and a transcription
    /// client. Returns the session and the event receiver for the
    /// presentation layer.
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        client: TranscriptionClient,
        merge_config: MergeConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(100);

        let inner = Arc::new(Inner {
            config,
            backend: Mutex::new(backend),
            client,
            merger: Mutex::new(TranscriptMerger::new(merge_config)),
            events_tx,
            status: StdMutex::new(SessionStatus::Ready),
            started_at: StdMutex::new(None),
            is_recording: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            device_lost: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        (
            Self {
                inner,
                pipeline_task: Mutex::new(None),
            },
            events_rx,
        )
    }

    pub fn session_id(&self) -> &str {
        &self.inner.config.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.current_status()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.is_recording.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.inner.started_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current transcript segments
    pub async fn transcript(&self) -> Vec<String> {
        self.inner.merger.lock().await.segments().to_vec()
    }

    /// Clear the transcript (explicit user action)
    pub async fn clear_transcript(&self) {
        self.inner.merger.lock().await.clear();
    }

    /// Ready → Recording: acquire the device and start the pipeline.
    ///
    /// On acquisition failure the session stays Ready and the error is
    /// returned synchronously.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.inner.is_recording.swap(true, Ordering::SeqCst) {
            warn!("Recording already started");
            return Ok(());
        }

        info!("Starting recording session: {}", self.inner.config.session_id);

        let audio_rx = {
            let mut backend = self.inner.backend.lock().await;
            match backend.start().await {
                Ok(rx) => rx,
                Err(e) => {
                    self.inner.is_recording.store(false, Ordering::SeqCst);
                    return Err(SessionError::DeviceAccess(format!("{:#}", e)));
                }
            }
        };

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.inner.device_lost.store(false, Ordering::SeqCst);
        self.inner.in_flight.store(false, Ordering::SeqCst);
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
        *self
            .inner
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(chrono::Utc::now());

        self.inner.set_status(SessionStatus::Recording);

        let task = tokio::spawn(run_pipeline(Arc::clone(&self.inner), audio_rx));
        {
            let mut handle = self.pipeline_task.lock().await;
            if let Some(previous) = handle.take() {
                // Finished on its own (device loss or failure ceiling)
                if let Err(e) = previous.await {
                    error!("Pipeline task panicked: {}", e);
                }
            }
            *handle = Some(task);
        }

        Ok(())
    }

    /// Recording → Ready: stop the timer, flush the remaining buffer as
    /// a final chunk (best effort, bounded wait), release the device.
    pub async fn stop(&self) -> anyhow::Result<()> {
        if !self.inner.is_recording.load(Ordering::SeqCst) {
            // The pipeline may have already wound down (device loss or
            // failure ceiling); reap its task handle.
            if let Some(task) = self.pipeline_task.lock().await.take() {
                if let Err(e) = task.await {
                    error!("Pipeline task panicked: {}", e);
                }
            }
            warn!("Recording not active");
            return Ok(());
        }

        info!("Stopping recording session: {}", self.inner.config.session_id);

        self.inner.stop_requested.store(true, Ordering::SeqCst);
        self.inner.shutdown.notify_one();

        {
            let mut handle = self.pipeline_task.lock().await;
            if let Some(task) = handle.take() {
                if let Err(e) = task.await {
                    error!("Pipeline task panicked: {}", e);
                }
            }
        }

        {
            let mut backend = self.inner.backend.lock().await;
            if let Err(e) = backend.stop().await {
                error!("Failed to release audio backend: {}", e);
            }
        }

        self.inner.is_recording.store(false, Ordering::SeqCst);
        self.inner.set_status(SessionStatus::Ready);
        self.inner.emit(SessionEvent::Latency(0));

        info!("Recording session stopped");
        Ok(())
    }

    /// Re-attempt device acquisition after device loss, on the same
    /// session object. Success clears the lost flag and behaves like a
    /// fresh Ready → Recording transition.
    pub async fn retry(&self) -> Result<(), SessionError> {
        if !self.inner.device_lost.load(Ordering::SeqCst) {
            debug!("Retry requested without a lost device; starting normally");
        }

        self.start().await
    }
}

impl Inner {
    fn current_status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: SessionStatus) {
        {
            let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
            if *current == status {
                return;
            }
            *current = status;
        }
        self.emit(SessionEvent::Status(status));
    }

    /// Event delivery never blocks the pipeline; a saturated or dropped
    /// receiver loses the event.
    fn emit(&self, event: SessionEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events_tx.try_send(event) {
            warn!("Event channel full, dropping {:?}", event);
        }
    }
}

/// The single cooperative task driving one session: consumes capture
/// frames, emits a chunk per timer tick, and hands non-empty chunks to
/// the submission task (one at a time).
async fn run_pipeline(inner: Arc<Inner>, mut audio_rx: mpsc::Receiver<AudioFrame>) {
    let mut segmenter = OverlapSegmenter::new(SegmenterConfig {
        chunk_interval: inner.config.chunk_interval,
        overlap: inner.config.overlap,
    });

    let start = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval_at(
        start + inner.config.chunk_interval,
        inner.config.chunk_interval,
    );
    // A tick that fires while the loop is busy is dropped, not queued
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!(
        "Pipeline started (interval {:?}, overlap {:?})",
        inner.config.chunk_interval, inner.config.overlap
    );

    loop {
        tokio::select! {
            maybe_frame = audio_rx.recv() => {
                match maybe_frame {
                    Some(frame) => segmenter.push_frame(frame),
                    None => {
                        if inner.stop_requested.load(Ordering::SeqCst) {
                            // Backend released by stop(); flush below
                            finish_stop(&inner, &mut segmenter).await;
                        } else {
                            handle_device_loss(&inner).await;
                        }
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                // After a terminal error the shutdown branch finishes the
                // loop; ticks in between are ignored.
                if inner.is_recording.load(Ordering::SeqCst) {
                    handle_tick(&inner, &mut segmenter);
                }
            }

            _ = inner.shutdown.notified() => {
                if inner.stop_requested.load(Ordering::SeqCst) {
                    finish_stop(&inner, &mut segmenter).await;
                } else {
                    // Terminal error path: no flush, just release the device
                    debug!("Pipeline shut down after terminal error");
                    let mut backend = inner.backend.lock().await;
                    if let Err(e) = backend.stop().await {
                        error!("Failed to release audio backend: {}", e);
                    }
                }
                return;
            }
        }
    }
}

/// One timer tick: skip if a submission is still in flight, skip empty
/// buffers, otherwise emit and submit.
fn handle_tick(inner: &Arc<Inner>, segmenter: &mut OverlapSegmenter) {
    if inner.in_flight.load(Ordering::SeqCst) {
        debug!("Previous submission still in flight, skipping this tick's chunk");
        return;
    }

    match segmenter.emit(false) {
        Ok(Some(chunk)) => {
            inner.in_flight.store(true, Ordering::SeqCst);
            tokio::spawn(submit_chunk(Arc::clone(inner), chunk));
        }
        Ok(None) => {
            debug!("No audio accumulated, skipping tick");
        }
        Err(e) => {
            error!("Failed to encode chunk: {:#}", e);
        }
    }
}

/// Submit one chunk through the retry loop and apply the outcome.
/// At most one of these runs per session at any time.
async fn submit_chunk(inner: Arc<Inner>, chunk: crate::audio::AudioChunk) {
    inner.set_status(SessionStatus::Transcribing);

    match inner.client.submit(&chunk).await {
        Ok(result) => {
            inner.consecutive_failures.store(0, Ordering::SeqCst);
            inner.emit(SessionEvent::Latency(result.latency_ms));
            apply_result(&inner, &result.text).await;

            if inner.is_recording.load(Ordering::SeqCst)
                && !inner.stop_requested.load(Ordering::SeqCst)
            {
                inner.set_status(SessionStatus::Recording);
            }
        }
        Err(e) => {
            let consecutive = inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                "Chunk dropped after {} attempts ({} consecutive failures)",
                e.attempts, consecutive
            );
            inner.emit(SessionEvent::Error(SessionError::ChunkTranscription(e)));

            if consecutive >= inner.config.max_consecutive_failures {
                error!("Consecutive failure ceiling reached, ending session");
                inner.emit(SessionEvent::Error(SessionError::RetryExhausted {
                    consecutive,
                }));
                inner.is_recording.store(false, Ordering::SeqCst);
                inner.set_status(SessionStatus::Ready);
                inner.shutdown.notify_one();
            } else if inner.is_recording.load(Ordering::SeqCst)
                && !inner.stop_requested.load(Ordering::SeqCst)
            {
                inner.set_status(SessionStatus::Recording);
            }
        }
    }

    inner.in_flight.store(false, Ordering::SeqCst);
}

/// Fold one result into the transcript and publish the new segments
async fn apply_result(inner: &Arc<Inner>, text: &str) {
    let segments = {
        let mut merger = inner.merger.lock().await;
        merger.push(text);
        merger.segments().to_vec()
    };
    inner.emit(SessionEvent::Transcript(segments));
}

/// Explicit stop: wait (bounded) for any in-flight submission, then
/// flush the remaining buffer as a final best-effort chunk.
async fn finish_stop(inner: &Arc<Inner>, segmenter: &mut OverlapSegmenter) {
    let deadline = tokio::time::Instant::now() + inner.config.stop_flush_timeout;
    while inner.in_flight.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }

    // A submission still running at the deadline keeps exclusive use of
    // the client; the flush is best effort, so the buffered tail is
    // dropped rather than submitted alongside it.
    if inner.in_flight.load(Ordering::SeqCst) {
        warn!("Submission still in flight at stop, dropping the final chunk");
        inner.set_status(SessionStatus::Complete);
        return;
    }

    match segmenter.emit(true) {
        Ok(Some(chunk)) => {
            debug!("Flushing final chunk ({}ms)", chunk.duration_ms);
            match tokio::time::timeout(
                inner.config.stop_flush_timeout,
                inner.client.submit_once(&chunk),
            )
            .await
            {
                Ok(Ok(result)) => {
                    inner.emit(SessionEvent::Latency(result.latency_ms));
                    apply_result(inner, &result.text).await;
                }
                Ok(Err(e)) => {
                    warn!("Final chunk flush failed: {:#}", e);
                }
                Err(_) => {
                    warn!("Final chunk flush timed out");
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!("Failed to encode final chunk: {:#}", e);
        }
    }

    inner.set_status(SessionStatus::Complete);
}

/// The frame channel closed without a stop request: the device is gone.
/// Emits exactly one DeviceLost error and returns the visible state to
/// Ready; the session can be retried explicitly.
async fn handle_device_loss(inner: &Arc<Inner>) {
    warn!("Audio track ended unexpectedly, device lost");

    inner.device_lost.store(true, Ordering::SeqCst);
    inner.is_recording.store(false, Ordering::SeqCst);
    inner.set_status(SessionStatus::DeviceLost);
    inner.emit(SessionEvent::Error(SessionError::DeviceLost));

    {
        let mut backend = inner.backend.lock().await;
        if let Err(e) = backend.stop().await {
            error!("Failed to release lost audio backend: {}", e);
        }
    }

    inner.set_status(SessionStatus::Ready);
}
