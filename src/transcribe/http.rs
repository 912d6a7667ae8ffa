use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::client::Transcriber;
use crate::audio::AudioChunk;
use crate::config::TranscriptionConfig;

/// Per-request timeout; also bounds the best-effort stop-flush
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Submits a chunk as a multipart upload to an HTTP STT endpoint
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl HttpTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let endpoint_url = config.endpoint_url.trim().to_string();
        if endpoint_url.is_empty() {
            bail!("Transcription endpoint URL is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint_url,
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            model: config
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        })
    }
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<String> {
        debug!(
            "Submitting {}ms chunk ({} bytes) to {}",
            chunk.duration_ms,
            chunk.data.len(),
            self.endpoint_url
        );

        let file_part = Part::bytes(chunk.data.clone())
            .file_name("chunk.wav")
            .mime_str(chunk.mime_type)
            .context("Failed to build multipart audio part")?;

        let mut form = Form::new().part("audio", file_part);
        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        let mut request = self.client.post(&self.endpoint_url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Transcription endpoint returned {}: {}", status, body);
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        Ok(body.text)
    }

    fn name(&self) -> &str {
        "http"
    }
}
