//! Audio capture abstraction
//!
//! A [`CaptureBackend`] hands out [`CaptureStream`]s for a requested [`CaptureMode`].
//! The pipeline first asks for microphone plus system audio and falls back to the
//! microphone alone. Every acquired stream is wrapped in an [`AcquiredDevice`] so the
//! device is released exactly once, whichever way the recording ends.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::VoiceError;

/// Which sources the recording includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CaptureMode {
    /// Microphone only
    #[default]
    #[serde(rename = "mic")]
    Mic,
    /// Microphone mixed with system/display audio
    #[serde(rename = "mic+system")]
    MicAndSystem,
}

impl CaptureMode {
    /// Wire/telemetry name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mic => "mic",
            Self::MicAndSystem => "mic+system",
        }
    }

    /// Badge shown next to the timer, if any
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self {
            Self::Mic => None,
            Self::MicAndSystem => Some("Mic + System"),
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform audio processing switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProcessing {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl AudioProcessing {
    /// Everything off; system audio is already mastered
    pub const RAW: Self = Self {
        echo_cancellation: false,
        noise_suppression: false,
        auto_gain_control: false,
    };

    /// Platform defaults for a voice microphone
    pub const VOICE: Self = Self {
        echo_cancellation: true,
        noise_suppression: true,
        auto_gain_control: true,
    };
}

/// What to acquire from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub mode: CaptureMode,
    pub processing: AudioProcessing,
}

impl CaptureRequest {
    /// Audio-only display capture with processing disabled
    #[must_use]
    pub const fn mic_and_system() -> Self {
        Self {
            mode: CaptureMode::MicAndSystem,
            processing: AudioProcessing::RAW,
        }
    }

    /// Plain microphone capture
    #[must_use]
    pub const fn microphone() -> Self {
        Self {
            mode: CaptureMode::Mic,
            processing: AudioProcessing::VOICE,
        }
    }
}

/// Capture backend failures
#[derive(Debug, Error)]
pub enum CaptureError {
    /// User or platform refused access
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The requested capture kind does not exist here
    #[error("capture unavailable: {0}")]
    Unavailable(String),

    /// Recorder cannot encode the requested format
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Device failed while open
    #[error("device error: {0}")]
    Device(String),
}

/// Source of capture streams (microphone, display audio, test doubles)
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open the devices for `request`
    ///
    /// The returned stream holds the device until [`CaptureStream::release`].
    async fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CaptureStream>, CaptureError>;

    /// Whether the recorder can encode `mime_type`
    fn supports_format(&self, mime_type: &str) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// An open capture device with its recorder
pub trait CaptureStream: Send {
    /// Begin recording in `mime_type`; the format is fixed until [`Self::finish`]
    ///
    /// # Errors
    ///
    /// Returns error if the recorder cannot start
    fn start(&mut self, mime_type: &str) -> Result<(), CaptureError>;

    /// Stop recording and flush every buffered chunk
    ///
    /// # Errors
    ///
    /// Returns error if buffered media cannot be encoded
    fn finish(&mut self) -> Result<Vec<Vec<u8>>, CaptureError>;

    /// Stop all device tracks
    fn release(&mut self);
}

/// Owns an acquired stream and releases it exactly once
pub struct AcquiredDevice {
    stream: Option<Box<dyn CaptureStream>>,
}

impl AcquiredDevice {
    #[must_use]
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Start the recorder
    ///
    /// # Errors
    ///
    /// Returns error if the recorder refuses the format
    pub fn start(&mut self, mime_type: &str) -> Result<(), CaptureError> {
        match self.stream.as_mut() {
            Some(stream) => stream.start(mime_type),
            None => Err(CaptureError::Device("device already released".to_string())),
        }
    }

    /// Flush the recorder and release the device, even if flushing fails
    ///
    /// # Errors
    ///
    /// Returns the flush error after the device has been released
    pub fn finish(mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(Vec::new());
        };
        let flushed = stream.finish();
        stream.release();
        tracing::debug!("capture device released");
        flushed
    }
}

impl Drop for AcquiredDevice {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            tracing::debug!("capture device released on drop");
        }
    }
}

/// Acquire combined capture, falling back to the microphone alone
///
/// # Errors
///
/// Returns [`VoiceError::PermissionDenied`] when neither request succeeds
pub async fn acquire_with_fallback(
    backend: &dyn CaptureBackend,
) -> Result<(AcquiredDevice, CaptureMode), VoiceError> {
    match backend.acquire(CaptureRequest::mic_and_system()).await {
        Ok(stream) => {
            tracing::info!(backend = backend.name(), "recording with system audio enabled");
            return Ok((AcquiredDevice::new(stream), CaptureMode::MicAndSystem));
        }
        Err(e) => {
            tracing::info!(
                backend = backend.name(),
                error = %e,
                "system audio capture not available, falling back to microphone only"
            );
        }
    }

    match backend.acquire(CaptureRequest::microphone()).await {
        Ok(stream) => Ok((AcquiredDevice::new(stream), CaptureMode::Mic)),
        Err(e) => {
            tracing::error!(backend = backend.name(), error = %e, "error accessing audio");
            Err(VoiceError::PermissionDenied)
        }
    }
}
