// Integration tests for the recording session state machine
//
// A scripted backend stands in for the capture device and a scripted
// transcriber for the remote STT endpoint, so device loss, failure
// ceilings and submission serialization can be driven deterministically.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use livescribe::{
    AudioBackend, AudioChunk, AudioFrame, MergeConfig, RecordingSession, RetryPolicy,
    SessionConfig, SessionError, SessionEvent, SessionStatus, Transcriber, TranscriptionClient,
};

const SAMPLE_RATE: u32 = 16000;
const FRAME_MS: u64 = 10;

fn frames(count: u64) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| AudioFrame {
            samples: vec![(i % 100) as i16; (SAMPLE_RATE as u64 * FRAME_MS / 1000) as usize],
            sample_rate: SAMPLE_RATE,
            channels: 1,
            timestamp_ms: i * FRAME_MS,
        })
        .collect()
}

/// Replays a fixed frame sequence on every start. With `hold_open` the
/// sender stays alive after the frames run out; without it the channel
/// closes, which a recording session sees as device loss.
struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    frame_interval: Duration,
    hold_open: bool,
    capturing: Arc<AtomicBool>,
}

impl ScriptedBackend {
    fn new(frames: Vec<AudioFrame>, hold_open: bool) -> Self {
        Self {
            frames,
            frame_interval: Duration::from_millis(FRAME_MS),
            hold_open,
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(256);
        self.capturing.store(true, Ordering::SeqCst);

        let frames = self.frames.clone();
        let interval = self.frame_interval;
        let hold_open = self.hold_open;
        let capturing = Arc::clone(&self.capturing);

        tokio::spawn(async move {
            for frame in frames {
                tokio::time::sleep(interval).await;
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }
                if tx.send(frame).await.is_err() {
                    return;
                }
            }

            while hold_open && capturing.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A backend whose device can never be acquired
struct DeniedBackend;

#[async_trait::async_trait]
impl AudioBackend for DeniedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        bail!("permission denied")
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied"
    }
}

/// Counts calls and concurrency; fails every call when `always_fail`
struct CountingTranscriber {
    delay: Duration,
    always_fail: bool,
    calls: Arc<AtomicU32>,
    current: Arc<AtomicU32>,
    max_concurrent: Arc<AtomicU32>,
}

impl CountingTranscriber {
    fn new(delay: Duration, always_fail: bool) -> Self {
        Self {
            delay,
            always_fail,
            calls: Arc::new(AtomicU32::new(0)),
            current: Arc::new(AtomicU32::new(0)),
            max_concurrent: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for CountingTranscriber {
    async fn transcribe(&self, _chunk: &AudioChunk) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.always_fail {
            bail!("scripted transcription failure");
        }
        Ok(format!("segment number {}", call))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn session_config(chunk_interval: Duration) -> SessionConfig {
    SessionConfig {
        chunk_interval,
        overlap: Duration::from_millis(20),
        max_consecutive_failures: 3,
        stop_flush_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

fn build_session(
    backend: Box<dyn AudioBackend>,
    transcriber: Box<dyn Transcriber>,
    policy: RetryPolicy,
    chunk_interval: Duration,
) -> (RecordingSession, mpsc::Receiver<SessionEvent>) {
    RecordingSession::new(
        session_config(chunk_interval),
        backend,
        TranscriptionClient::new(transcriber, policy),
        MergeConfig::default(),
    )
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        backoff_base: Duration::from_millis(1),
    }
}

fn drain(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn device_access_failure_keeps_session_ready() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::ZERO, false);
    let (session, _events) = build_session(
        Box::new(DeniedBackend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_millis(50),
    );

    let err = session.start().await.expect_err("acquisition fails");
    assert!(matches!(err, SessionError::DeviceAccess(_)));
    assert_eq!(session.status(), SessionStatus::Ready);
    assert!(!session.is_recording());
    Ok(())
}

#[tokio::test]
async fn submissions_are_never_parallelized() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::from_millis(240), false);
    let calls = Arc::clone(&transcriber.calls);
    let max_concurrent = Arc::clone(&transcriber.max_concurrent);

    let backend = ScriptedBackend::new(frames(200), true);
    let (session, _events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_millis(50),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(600)).await;
    session.stop().await?;

    assert!(calls.load(Ordering::SeqCst) >= 2, "several chunks submitted");
    assert_eq!(
        max_concurrent.load(Ordering::SeqCst),
        1,
        "only one submission in flight at a time"
    );
    Ok(())
}

#[tokio::test]
async fn results_apply_in_submission_order() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::from_millis(10), false);
    let backend = ScriptedBackend::new(frames(200), true);
    let (session, _events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_millis(40),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(400)).await;
    session.stop().await?;

    let transcript = session.transcript().await;
    assert!(transcript.len() >= 2, "expected several segments");

    let numbers: Vec<u32> = transcript
        .iter()
        .map(|s| s.rsplit(' ').next().unwrap().parse().unwrap())
        .collect();
    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    assert_eq!(numbers, sorted, "segments out of submission order");
    Ok(())
}

#[tokio::test]
async fn device_loss_emits_one_error_and_returns_to_ready() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::ZERO, false);
    let backend = ScriptedBackend::new(frames(5), false);
    let (session, mut events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_secs(10),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!session.is_recording());
    assert_eq!(session.status(), SessionStatus::Ready);

    let collected = drain(&mut events);
    let device_lost = collected
        .iter()
        .filter(|e| matches!(e, SessionEvent::Error(SessionError::DeviceLost)))
        .count();
    assert_eq!(device_lost, 1, "exactly one DeviceLost notification");

    let saw_device_lost_status = collected
        .iter()
        .any(|e| matches!(e, SessionEvent::Status(SessionStatus::DeviceLost)));
    assert!(saw_device_lost_status);
    Ok(())
}

#[tokio::test]
async fn device_loss_is_recoverable_via_retry() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::ZERO, false);
    let backend = ScriptedBackend::new(frames(5), false);
    let (session, mut events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_secs(10),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(session.status(), SessionStatus::Ready);
    drain(&mut events);

    session.retry().await.expect("retry re-acquires the device");
    assert!(session.is_recording());
    assert_eq!(session.status(), SessionStatus::Recording);

    tokio::time::sleep(Duration::from_millis(20)).await;
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn consecutive_chunk_failures_end_the_session() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::ZERO, true);
    let backend = ScriptedBackend::new(frames(200), true);
    let (session, mut events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_millis(30),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(!session.is_recording());
    assert_eq!(session.status(), SessionStatus::Ready);
    assert!(session.transcript().await.is_empty());

    let collected = drain(&mut events);
    let chunk_errors = collected
        .iter()
        .filter(|e| matches!(e, SessionEvent::Error(SessionError::ChunkTranscription(_))))
        .count();
    let exhausted = collected
        .iter()
        .filter(|e| matches!(e, SessionEvent::Error(SessionError::RetryExhausted { .. })))
        .count();

    assert_eq!(chunk_errors, 3, "one error per dropped chunk");
    assert_eq!(exhausted, 1, "one terminal error");

    // Stop after the pipeline already wound down is a clean no-op
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn stop_flushes_buffered_audio_as_final_chunk() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::from_millis(10), false);
    let calls = Arc::clone(&transcriber.calls);

    let backend = ScriptedBackend::new(frames(200), true);
    let (session, mut events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_secs(10), // no tick fires before stop
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(150)).await;
    session.stop().await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "single best-effort flush");
    assert_eq!(session.transcript().await, ["segment number 1"]);
    assert_eq!(session.status(), SessionStatus::Ready);

    let collected = drain(&mut events);
    assert!(collected
        .iter()
        .any(|e| matches!(e, SessionEvent::Status(SessionStatus::Complete))));
    assert!(collected
        .iter()
        .any(|e| matches!(e, SessionEvent::Latency(0))));
    Ok(())
}

#[tokio::test]
async fn stop_with_submission_in_flight_drops_the_final_chunk() -> Result<()> {
    // The first chunk's submission outlives the stop-flush bound; the
    // final chunk must be dropped, never submitted alongside it.
    let transcriber = CountingTranscriber::new(Duration::from_millis(500), false);
    let calls = Arc::clone(&transcriber.calls);
    let max_concurrent = Arc::clone(&transcriber.max_concurrent);

    let backend = ScriptedBackend::new(frames(200), true);
    let config = SessionConfig {
        chunk_interval: Duration::from_millis(50),
        overlap: Duration::from_millis(20),
        max_consecutive_failures: 3,
        stop_flush_timeout: Duration::from_millis(100),
        ..SessionConfig::default()
    };
    let (session, mut events) = RecordingSession::new(
        config,
        Box::new(backend),
        TranscriptionClient::new(Box::new(transcriber), fast_policy()),
        MergeConfig::default(),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(80)).await;
    session.stop().await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "no flush while in flight");

    // Let the straggling submission finish; nothing else may have run
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "final chunk was dropped");
    assert_eq!(
        max_concurrent.load(Ordering::SeqCst),
        1,
        "submissions stayed serialized through stop"
    );

    let collected = drain(&mut events);
    assert!(collected
        .iter()
        .any(|e| matches!(e, SessionEvent::Status(SessionStatus::Complete))));
    Ok(())
}

#[tokio::test]
async fn transcript_can_be_cleared() -> Result<()> {
    let transcriber = CountingTranscriber::new(Duration::ZERO, false);
    let backend = ScriptedBackend::new(frames(200), true);
    let (session, _events) = build_session(
        Box::new(backend),
        Box::new(transcriber),
        fast_policy(),
        Duration::from_secs(10),
    );

    session.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.stop().await?;

    assert!(!session.transcript().await.is_empty());
    session.clear_transcript().await;
    assert!(session.transcript().await.is_empty());
    Ok(())
}
