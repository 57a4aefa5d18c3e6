//! Speech-to-text (STT) upload to the backend transcription endpoint

use std::time::Duration;

use reqwest::multipart::{Form, Part};

use super::{AudioArtifact, VoiceError};
use crate::config::{ApiBase, Config};

/// Fallback reason when an error body cannot be parsed
const UNKNOWN_ERROR: &str = "Unknown error";

/// Response from the transcription endpoint
#[derive(serde::Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Uploads finished recordings for transcription
pub struct TranscriptionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl TranscriptionClient {
    /// Create a client posting to `{api_base}/api/transcribe`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_base: &ApiBase, model: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: api_base.transcribe_url(),
            model: model.into(),
        })
    }

    /// Create a client from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Self::new(&config.api_base, config.voice.stt_model.clone(), config.voice.timeout)
    }

    /// Transcription endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Model identifier sent with each upload
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Upload an artifact and return the transcribed text
    ///
    /// The artifact is consumed; each recording is uploaded once.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Transcription`] if the upload fails or the backend
    /// rejects it
    pub async fn transcribe(&self, artifact: AudioArtifact) -> Result<String, VoiceError> {
        let (bytes, mime_type, filename) = artifact.into_parts();

        tracing::debug!(
            audio_bytes = bytes.len(),
            filename = %filename,
            mime_type = %mime_type,
            "uploading audio file"
        );

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str(&mime_type)
            .map_err(|e| VoiceError::transcription(format!("invalid MIME type: {e}")))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                VoiceError::transcription(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = error_reason(&body, status);
            tracing::error!(status = %status, reason = %reason, "transcription failed");
            return Err(VoiceError::transcription(reason));
        }

        let result: TranscribeResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            VoiceError::transcription(format!("invalid transcription response: {e}"))
        })?;

        tracing::info!(chars = result.text.len(), "transcription complete");
        Ok(result.text)
    }
}

/// Best-effort reason from an error body
///
/// Non-JSON bodies give "Unknown error"; JSON without a usable `error` field gives the
/// status reason phrase.
fn error_reason(body: &str, status: reqwest::StatusCode) -> String {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) else {
        return UNKNOWN_ERROR.to_string();
    };

    match parsed.get("error") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Object(map)) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| serde_json::Value::Object(map.clone()).to_string(), ToString::to_string),
        _ => status
            .canonical_reason()
            .unwrap_or(UNKNOWN_ERROR)
            .to_string(),
    }
}
