//! Chat session credential broker
//!
//! Exchanges the page origin and a caller identity for a short-lived client secret
//! that lets the chat widget open a conversation session.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::{IdentityStore, resolve_identity};
use crate::config::{ApiBase, Config};

/// Credential issuance failures
///
/// All variants are terminal for the call; nothing is retried.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Request could not be sent or the response body could not be read
    #[error("session request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("failed to create session: {status} - {body}")]
    Http { status: u16, body: String },

    /// Backend answered successfully but reported an error
    #[error("backend error: {0}")]
    BackendDeclared(String),

    /// Backend answered successfully without a client secret
    #[error("no client_secret in response: {0}")]
    MalformedResponse(String),
}

/// Short-lived credential for the chat widget
///
/// Never stored by this crate; hand it straight to the widget integration.
#[derive(Debug)]
pub struct SessionCredential {
    secret: SecretString,
    origin: String,
    identity: String,
}

impl SessionCredential {
    /// The client secret
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Origin the credential was requested for
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Identity the credential was requested for
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    origin: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Interpret the `error` field the way a truthiness check would
fn declared_error(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::Number(n) if n.as_f64().is_some_and(|v| v.abs() < f64::EPSILON) => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Requests chat session credentials from the backend
pub struct CredentialBroker {
    client: reqwest::Client,
    endpoint: String,
    origin: String,
    identities: Arc<dyn IdentityStore>,
}

impl CredentialBroker {
    /// Create a broker
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        api_base: &ApiBase,
        origin: impl Into<String>,
        identities: Arc<dyn IdentityStore>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: api_base.session_url(),
            origin: origin.into(),
            identities,
        })
    }

    /// Create a broker from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config, identities: Arc<dyn IdentityStore>) -> crate::Result<Self> {
        Self::new(
            &config.api_base,
            config.origin.clone(),
            identities,
            config.session.timeout,
        )
    }

    /// Session endpoint this broker posts to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue a credential for the chat widget
    ///
    /// `existing` marks a refresh; it is issued exactly like a new credential.
    /// A blank `caller_identity` falls back to the persisted device identity.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialError`] describing why no credential was issued
    pub async fn issue_credential(
        &self,
        existing: Option<&SecretString>,
        caller_identity: Option<&str>,
        origin_override: Option<&str>,
    ) -> Result<SessionCredential, CredentialError> {
        if existing.is_some() {
            tracing::info!("refreshing existing session");
        }

        let origin = origin_override.unwrap_or(self.origin.as_str());
        let identity = resolve_identity(self.identities.as_ref(), caller_identity);

        tracing::debug!(endpoint = %self.endpoint, origin = %origin, "requesting chat session");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&SessionRequest {
                origin,
                user_id: &identity,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "session request failed");
                CredentialError::Network(e)
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "session response received");

        let body = response.text().await.map_err(CredentialError::Network)?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "session creation failed");
            return Err(CredentialError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let Ok(parsed) = serde_json::from_str::<SessionResponse>(&body) else {
            tracing::error!(body = %body, "unparsable session response");
            return Err(CredentialError::MalformedResponse(body));
        };

        if let Some(message) = declared_error(parsed.error) {
            tracing::error!(error = %message, "backend declined session");
            return Err(CredentialError::BackendDeclared(message));
        }

        let Some(secret) = parsed.client_secret.filter(|s| !s.is_empty()) else {
            tracing::error!(body = %body, "no client_secret in response");
            return Err(CredentialError::MalformedResponse(body));
        };

        tracing::info!(origin = %origin, "chat session created");

        Ok(SessionCredential {
            secret: SecretString::from(secret),
            origin: origin.to_string(),
            identity,
        })
    }
}
