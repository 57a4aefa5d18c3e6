//! Configuration management for chatvoice

mod endpoint;
pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

pub use endpoint::{ApiBase, BaseSource, DEV_API_BASE, SESSION_PATH, TRANSCRIBE_PATH};

use crate::Result;

/// Origin assumed when none is configured (the front end dev server)
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Default transcription model
pub const DEFAULT_STT_MODEL: &str = "whisper-1";

/// Default upstream API for the backend server
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1";

/// chatvoice configuration
#[derive(Debug)]
pub struct Config {
    /// Backend API base shared by the voice pipeline and credential broker
    pub api_base: ApiBase,

    /// Origin of the page embedding the chat widget
    pub origin: String,

    /// Path to data directory (persisted identity)
    pub data_dir: PathBuf,

    /// Voice pipeline configuration
    pub voice: VoiceConfig,

    /// Credential broker configuration
    pub session: SessionConfig,

    /// Backend server configuration
    pub server: ServerConfig,
}

/// Voice pipeline configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Model identifier sent with every upload
    pub stt_model: String,

    /// Client-side timeout for the transcription upload
    pub timeout: Duration,

    /// Minimum time the transcribing indicator stays visible
    pub min_indicator: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: DEFAULT_STT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            min_indicator: Duration::from_millis(500),
        }
    }
}

/// Credential broker configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Client-side timeout for the session request
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }
}

/// Backend server configuration
#[derive(Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Directory with a built web front end to serve
    pub static_dir: Option<PathBuf>,

    /// Upstream API base
    pub upstream_url: String,

    /// Upstream API key (from `OPENAI_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Chat workflow identifier
    pub workflow_id: Option<String>,

    /// Domain verification key
    pub domain_key: Option<String>,

    /// User sent upstream when the caller supplies none
    pub default_user: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            static_dir: None,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            workflow_id: None,
            domain_key: None,
            default_user: "guest".to_string(),
        }
    }
}

/// Read an environment variable, treating empty values as unset
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(name: &str) -> Option<u64> {
    env_var(name).and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if the API base cannot be resolved
    pub fn load() -> Result<Self> {
        Self::load_with_origin(None)
    }

    /// Load configuration with an explicit origin override
    ///
    /// # Errors
    ///
    /// Returns error if the API base cannot be resolved
    pub fn load_with_origin(origin_override: Option<&str>) -> Result<Self> {
        // env > toml > default
        let fc = file::load_config_file();

        let origin = origin_override
            .map(ToString::to_string)
            .or_else(|| env_var("CHATVOICE_ORIGIN"))
            .or(fc.api.origin)
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());

        let production = env_var("CHATVOICE_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .or(fc.api.production)
            .unwrap_or(false);

        let configured = env_var("CHATVOICE_API_URL").or(fc.api.url);

        // Resolved once, shared by both clients
        let api_base = ApiBase::resolve(configured.as_deref(), production, &origin)?;

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            stt_model: env_var("CHATVOICE_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.stt_model),
            timeout: env_secs("CHATVOICE_TRANSCRIBE_TIMEOUT_SECS")
                .or(fc.voice.timeout_secs)
                .map_or(defaults.timeout, Duration::from_secs),
            min_indicator: fc
                .voice
                .min_indicator_ms
                .map_or(defaults.min_indicator, Duration::from_millis),
        };

        let session = SessionConfig {
            timeout: env_secs("CHATVOICE_SESSION_TIMEOUT_SECS")
                .or(fc.session.timeout_secs)
                .map_or(SessionConfig::default().timeout, Duration::from_secs),
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            port: env_var("PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(server_defaults.port),
            static_dir: env_var("CHATVOICE_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
            upstream_url: env_var("CHATVOICE_UPSTREAM_URL")
                .or(fc.server.upstream_url)
                .unwrap_or(server_defaults.upstream_url),
            api_key: env_var("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            workflow_id: env_var("CHATKIT_WORKFLOW_ID").or(fc.server.workflow_id),
            domain_key: env_var("OPENAI_DOMAIN_KEY").or(fc.server.domain_key),
            default_user: env_var("CHATVOICE_DEFAULT_USER")
                .or(fc.server.default_user)
                .unwrap_or(server_defaults.default_user),
        };

        // Determine data directory (~/.local/share/chatvoice on Linux)
        let data_dir = env_var("CHATVOICE_DATA_DIR").map_or_else(
            || {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("chatvoice"))
            },
            PathBuf::from,
        );

        tracing::debug!(
            origin = %origin,
            api_base = %api_base.root(),
            source = ?api_base.source(),
            stt_model = %voice.stt_model,
            "configuration loaded"
        );

        Ok(Self {
            api_base,
            origin,
            data_dir,
            voice,
            session,
            server,
        })
    }

    /// Path of the persisted identity file
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity.json")
    }
}
