//! Speech-to-text seam used by the audio loader.
//!
//! [`WhisperHttpTranscriber`] talks to any server exposing the OpenAI-style
//! `POST /v1/audio/transcriptions` endpoint (whisper.cpp server, faster-whisper
//! server, the hosted API).

use crate::config::TranscriptionConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Recognized text of the whole audio file.
    async fn transcribe(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Clone, Debug)]
pub struct WhisperHttpTranscriber {
    client: Client,
    endpoint: String,
    model: String,
    language: Option<String>,
}

impl WhisperHttpTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| IngestError::Transcription("invalid API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| IngestError::Transcription(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/audio/transcriptions",
                config.endpoint.trim_end_matches('/')
            ),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transcriber for WhisperHttpTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let mut form = Form::new()
            .text("model", self.model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        tracing::debug!("Sending {} to {}", path.display(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::Transcription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(IngestError::Transcription(format!(
                "server returned {status}: {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Transcription(format!("invalid response: {e}")))?;
        Ok(parsed.text)
    }
}
