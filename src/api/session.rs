//! Chat session endpoint
//!
//! Exchanges the server's API key for a short-lived client secret scoped to a
//! workflow and user.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, ApiState};

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/chatkit/session", post(create_session))
        .with_state(state)
}

/// Session request body; every field is optional and the body may be empty
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub origin: Option<String>,
    pub user_id: Option<String>,
}

/// Session response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub client_secret: String,
    pub origin: Option<String>,
}

/// Origin from the body, else the `Origin` header, else the `Referer` header
fn request_origin(body: Option<String>, headers: &HeaderMap) -> Option<String> {
    body.filter(|o| !o.is_empty()).or_else(|| {
        [header::ORIGIN, header::REFERER]
            .iter()
            .find_map(|name| headers.get(name)?.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    })
}

/// Create a chat session and return its client secret
async fn create_session(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid session request: {e}")))?
    };

    let api_key = state.api_key()?;
    let workflow_id = state
        .workflow_id
        .as_deref()
        .ok_or_else(|| ApiError::NotConfigured("CHATKIT_WORKFLOW_ID is not set".to_string()))?;

    let origin = request_origin(request.origin, &headers);
    let user = request
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| state.default_user.clone());

    tracing::info!(origin = ?origin, user = %user, "creating chat session");

    let mut upstream = state
        .client
        .post(state.upstream("/chatkit/sessions"))
        .bearer_auth(api_key.expose_secret())
        .header("OpenAI-Beta", "chatkit_beta=v1")
        .json(&json!({
            "workflow": { "id": workflow_id },
            "user": user,
        }));

    if let Some(domain_key) = &state.domain_key {
        upstream = upstream.header("OpenAI-Domain-Key", domain_key);
    }

    let response = upstream.send().await.map_err(|e| {
        tracing::error!(error = %e, "session request failed");
        ApiError::Upstream(format!("failed to reach upstream: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %text, "upstream rejected session request");
        return Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized("Invalid OpenAI API key".to_string()),
            StatusCode::FORBIDDEN => {
                ApiError::Forbidden("ChatKit access not enabled for this API key".to_string())
            }
            _ => ApiError::Upstream(format!("upstream error ({status}): {text}")),
        });
    }

    let data: serde_json::Value = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "failed to parse upstream session response");
        ApiError::Upstream(format!("failed to parse upstream response: {e}"))
    })?;

    let client_secret = data
        .get("client_secret")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            tracing::error!("no client_secret in upstream response");
            ApiError::Upstream("No client_secret returned from upstream".to_string())
        })?
        .to_string();

    tracing::info!("chat session created");

    Ok(Json(CreateSessionResponse {
        client_secret,
        origin,
    }))
}
