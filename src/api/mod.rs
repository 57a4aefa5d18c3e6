//! HTTP backend for the chat front end
//!
//! Issues chat session client secrets and proxies transcription uploads to the
//! upstream API so the API key never reaches the browser.

pub mod health;
pub mod session;
pub mod voice;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ServerConfig};
use crate::Result;

/// Shared state for API handlers
pub struct ApiState {
    pub client: reqwest::Client,
    /// Upstream API base, without trailing slash
    pub upstream_url: String,
    pub api_key: Option<SecretString>,
    pub workflow_id: Option<String>,
    pub domain_key: Option<String>,
    /// User sent upstream when the request names none
    pub default_user: String,
    /// Model used when an upload does not name one
    pub stt_model: String,
}

impl ApiState {
    /// Build state from server configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(server: &ServerConfig, stt_model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            upstream_url: server.upstream_url.trim_end_matches('/').to_string(),
            api_key: server
                .api_key
                .as_ref()
                .map(|k| SecretString::from(k.expose_secret().to_owned())),
            workflow_id: server.workflow_id.clone(),
            domain_key: server.domain_key.clone(),
            default_user: server.default_user.clone(),
            stt_model: stt_model.into(),
        })
    }

    fn upstream(&self, path: &str) -> String {
        format!("{}{path}", self.upstream_url)
    }

    fn api_key(&self) -> std::result::Result<&SecretString, ApiError> {
        self.api_key
            .as_ref()
            .ok_or_else(|| ApiError::NotConfigured("OPENAI_API_KEY is not set".to_string()))
    }
}

/// Errors returned to the front end as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotConfigured(String),
    Unauthorized(String),
    Forbidden(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, error) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotConfigured(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, port: u16, static_dir: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(state),
            port,
            static_dir,
        }
    }

    /// Build a server from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let state = ApiState::new(&config.server, config.voice.stt_model.clone())?;
        Ok(Self::new(
            state,
            config.server.port,
            config.server.static_dir.clone(),
        ))
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(session::router(self.state.clone()))
            .merge(voice::router(self.state.clone()))
            .merge(health::router());

        // Serve a built front end if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).fallback(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from the front end
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, session and transcription requests will fail");
        }
        if self.state.workflow_id.is_none() {
            tracing::warn!("CHATKIT_WORKFLOW_ID not set, session requests will fail");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
