//! Backend API base resolution
//!
//! Both the transcription client and the credential broker talk to the same backend.
//! The base is picked once at startup with a fixed precedence:
//!
//! 1. an explicitly configured API URL
//! 2. in production builds, the page's own origin (relative requests)
//! 3. otherwise the local development server

use url::Url;

use crate::{Error, Result};

/// Local development backend
pub const DEV_API_BASE: &str = "http://localhost:8000";

/// Path of the transcription endpoint
pub const TRANSCRIBE_PATH: &str = "/api/transcribe";

/// Path of the chat session endpoint
pub const SESSION_PATH: &str = "/api/chatkit/session";

/// Which tier of the precedence chain produced the base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSource {
    /// Explicitly configured URL
    Configured,
    /// Same origin as the calling page
    Relative,
    /// Local development default
    Development,
}

/// Resolved API base shared by the voice pipeline and the credential broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    source: BaseSource,
    root: String,
}

impl ApiBase {
    /// Resolve the API base
    ///
    /// A blank `configured` value counts as absent. Relative bases are anchored on
    /// `origin`, since requests leave this process as absolute URLs.
    ///
    /// # Errors
    ///
    /// Returns error if the chosen base is not a valid absolute URL
    pub fn resolve(configured: Option<&str>, production: bool, origin: &str) -> Result<Self> {
        let (source, raw) = match configured.map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => (BaseSource::Configured, url),
            None if production => (BaseSource::Relative, origin),
            None => (BaseSource::Development, DEV_API_BASE),
        };

        Url::parse(raw)
            .map_err(|e| Error::Config(format!("invalid API base {raw:?}: {e}")))?;

        let root = raw.trim_end_matches('/').to_string();
        tracing::debug!(?source, root = %root, "resolved API base");

        Ok(Self { source, root })
    }

    /// Which precedence tier was used
    #[must_use]
    pub const fn source(&self) -> BaseSource {
        self.source
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Append an absolute path (e.g. `/api/transcribe`) to the base
    ///
    /// Any path prefix on a configured base is preserved.
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        format!("{}{path}", self.root)
    }

    /// Full transcription endpoint URL
    #[must_use]
    pub fn transcribe_url(&self) -> String {
        self.join(TRANSCRIBE_PATH)
    }

    /// Full session endpoint URL
    #[must_use]
    pub fn session_url(&self) -> String {
        self.join(SESSION_PATH)
    }
}
