use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};

use livescribe::{
    AudioBackendConfig, AudioBackendFactory, AudioSource, Config, HttpTranscriber, MergeConfig,
    RecordingSession, RetryPolicy, SessionConfig, SessionEvent, TranscriptionClient,
};

#[derive(Parser)]
#[command(name = "livescribe", about = "Chunked live speech transcription")]
struct Args {
    /// Configuration file (name without extension, per the config crate)
    #[arg(short, long, default_value = "config/livescribe")]
    config: String,

    /// Transcribe a WAV file instead of the microphone
    #[arg(short, long)]
    input: Option<String>,

    /// Stop automatically after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("livescribe v0.1.0");
    info!(
        "Chunks: {}ms with {}ms overlap, endpoint: {}",
        cfg.audio.chunk_interval_ms, cfg.audio.overlap_ms, cfg.transcription.endpoint_url
    );

    let backend_config = AudioBackendConfig {
        target_sample_rate: cfg.audio.sample_rate,
        target_channels: cfg.audio.channels,
        ..Default::default()
    };

    let source = match &args.input {
        Some(path) => AudioSource::File(path.clone()),
        None => AudioSource::Microphone,
    };
    let backend = AudioBackendFactory::create(source, backend_config)?;

    let transcriber = HttpTranscriber::new(&cfg.transcription)?;
    let client = TranscriptionClient::new(
        Box::new(transcriber),
        RetryPolicy {
            max_attempts: cfg.retry.max_attempts,
            backoff_base: Duration::from_millis(cfg.retry.backoff_base_ms),
        },
    );

    let merge_config = MergeConfig {
        max_overlap_words: cfg.merge.max_overlap_words,
    };

    let (session, mut events) =
        RecordingSession::new(SessionConfig::from_config(&cfg), backend, client, merge_config);

    session.start().await?;
    info!("Recording (session {})", session.session_id());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Status(status) => info!("Status: {}", status),
                SessionEvent::Latency(ms) => info!("Latency: {}ms", ms),
                SessionEvent::Transcript(segments) => {
                    if let Some(last) = segments.last() {
                        println!("{}", last);
                    }
                }
                SessionEvent::Error(e) => warn!("{}", e),
            }
        }
    });

    match args.duration {
        Some(secs) => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("Duration elapsed, stopping");
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, stopping");
        }
    }

    session.stop().await?;

    let transcript = session.transcript().await;
    if !transcript.is_empty() {
        println!("--- transcript ---");
        println!("{}", transcript.join("\n"));
    }

    printer.abort();
    Ok(())
}
