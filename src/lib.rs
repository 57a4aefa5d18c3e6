//! chatvoice - Voice input and session credentials for an embedded chat widget
//!
//! This library provides:
//! - A voice pipeline: capture (microphone plus system audio when available),
//!   encode, upload for transcription, and deliver the text to the composer
//! - A credential broker that obtains chat session client secrets for a
//!   persisted caller identity
//! - The backend server both clients talk to
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  Chat surface                     │
//! │   start/stop control  │  status  │  chat widget   │
//! └──────────┬────────────────────────────┬──────────┘
//!            │                            │
//! ┌──────────▼───────────┐    ┌───────────▼──────────┐
//! │    VoicePipeline     │    │   CredentialBroker   │
//! │ capture → transcribe │    │  identity → secret   │
//! └──────────┬───────────┘    └───────────┬──────────┘
//!            │  POST /api/transcribe      │  POST /api/chatkit/session
//! ┌──────────▼────────────────────────────▼──────────┐
//! │              Backend (ApiBase)                    │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod voice;

pub use config::{ApiBase, Config};
pub use error::{Error, Result};
pub use session::{CredentialBroker, CredentialError, SessionCredential};
pub use voice::{TranscriptSink, VoiceError, VoicePipeline, VoiceStatus};
