//! TOML configuration file loading
//!
//! Supports `~/.config/chatvoice/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ChatvoiceConfigFile {
    /// Backend endpoint configuration
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Voice pipeline configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Credential broker configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Backend server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// API keys for upstream services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Explicit API base URL (e.g. "https://chat.example.com")
    pub url: Option<String>,

    /// Production build: use the page origin as the API base
    pub production: Option<bool>,

    /// Origin of the page embedding the chat widget
    pub origin: Option<String>,
}

/// Voice pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Transcription model identifier (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Client-side timeout for the transcription upload
    pub timeout_secs: Option<u64>,

    /// Minimum time the transcribing indicator stays visible
    pub min_indicator_ms: Option<u64>,
}

/// Credential broker configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Client-side timeout for the session request
    pub timeout_secs: Option<u64>,
}

/// Backend server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Directory with a built web front end to serve
    pub static_dir: Option<String>,

    /// Upstream API base (e.g. "https://api.openai.com/v1")
    pub upstream_url: Option<String>,

    /// Chat workflow identifier passed to the upstream session API
    pub workflow_id: Option<String>,

    /// Domain verification key for the upstream session API
    pub domain_key: Option<String>,

    /// User sent upstream when the caller supplies none
    pub default_user: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ChatvoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ChatvoiceConfigFile {
    let Some(path) = config_file_path() else {
        return ChatvoiceConfigFile::default();
    };

    if !path.exists() {
        return ChatvoiceConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config_file(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            ChatvoiceConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ChatvoiceConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config_file(content: &str) -> crate::Result<ChatvoiceConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/chatvoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chatvoice").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let fc = parse_config_file(
            r#"
            [api]
            url = "https://chat.example.com"

            [voice]
            stt_model = "whisper-large"
            "#,
        )
        .unwrap();

        assert_eq!(fc.api.url.as_deref(), Some("https://chat.example.com"));
        assert_eq!(fc.voice.stt_model.as_deref(), Some("whisper-large"));
        assert!(fc.server.port.is_none());
        assert!(fc.api_keys.openai.is_none());
    }

    #[test]
    fn test_parse_empty_file() {
        let fc = parse_config_file("").unwrap();
        assert!(fc.api.production.is_none());
    }

    #[test]
    fn test_parse_invalid_file() {
        assert!(parse_config_file("[api\nurl = ").is_err());
    }
}
