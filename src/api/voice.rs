//! Transcription proxy endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
};
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::voice::{AudioArtifact, WEBM};

/// Upstream rejects uploads above 25 MB
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/transcribe", post(transcribe))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Transcription response
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub text: String,
}

/// Audio and model read from the upload form
struct Upload {
    audio: AudioArtifact,
    model: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut audio = None;
    let mut model = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let mime_type = field.content_type().unwrap_or(WEBM).to_string();
                let filename = field.file_name().map(ToString::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                audio = Some(
                    AudioArtifact::new(bytes.to_vec(), mime_type)
                        .with_filename(filename.as_deref()),
                );
            }
            "model" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                model = Some(text).filter(|m| !m.trim().is_empty());
            }
            _ => {}
        }
    }

    let audio = audio
        .filter(|a| !a.bytes().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;

    Ok(Upload { audio, model })
}

/// Forward an uploaded recording to the upstream transcription API
async fn transcribe(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let api_key = state.api_key()?;
    let model = upload.model.unwrap_or_else(|| state.stt_model.clone());

    let (bytes, mime_type, filename) = upload.audio.into_parts();
    tracing::info!(bytes = bytes.len(), mime_type = %mime_type, model = %model, "transcribing upload");

    let part = Part::bytes(bytes)
        .file_name(filename)
        .mime_str(&mime_type)
        .map_err(|e| ApiError::BadRequest(format!("invalid MIME type: {e}")))?;
    let form = Form::new().part("file", part).text("model", model);

    let response = state
        .client
        .post(state.upstream("/audio/transcriptions"))
        .bearer_auth(api_key.expose_secret())
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "transcription request failed");
            ApiError::Upstream(format!("failed to reach upstream: {e}"))
        })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %text, "upstream transcription failed");
        return Err(ApiError::Upstream(format!(
            "transcription failed ({status}): {text}"
        )));
    }

    let result: TranscribeResponse = response.json().await.map_err(|e| {
        ApiError::Upstream(format!("invalid transcription response: {e}"))
    })?;

    tracing::info!(chars = result.text.len(), "transcription complete");
    Ok(Json(result))
}
