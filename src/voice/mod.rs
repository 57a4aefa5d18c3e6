//! Voice input for the chat composer
//!
//! Captures audio (microphone plus system audio when available), uploads the
//! finished recording for transcription and hands the text to a [`TranscriptSink`].

mod capture;
mod encoding;
mod native;
mod pipeline;
mod stt;
mod ticker;

use thiserror::Error;

pub use capture::{
    AcquiredDevice, AudioProcessing, CaptureBackend, CaptureError, CaptureMode, CaptureRequest,
    CaptureStream, acquire_with_fallback,
};
pub use encoding::{
    AudioArtifact, FALLBACK_FORMAT, FLAC, MP4, MPEG, OGG, PREFERRED_FORMATS, WAV, WEBM,
    extension_for_mime, negotiate_format,
};
pub use native::{NATIVE_FORMATS, NativeCapture, SAMPLE_RATE, samples_to_wav};
pub use pipeline::{
    MIN_INDICATOR, PendingTranscription, Toggle, TranscriptSink, VoicePipeline, VoiceStatus,
};
pub use stt::TranscriptionClient;
pub use ticker::{ElapsedTicker, format_elapsed};

/// Voice pipeline failures
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Neither combined nor microphone capture could be acquired
    #[error("audio access denied: check microphone permissions and try again")]
    PermissionDenied,

    /// Recorder refused the negotiated format
    #[error("unsupported recording format: {0}")]
    UnsupportedFormat(String),

    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,

    /// Device failed while recording or flushing
    #[error("capture failed: {0}")]
    Capture(String),

    /// Upload failed or the backend rejected it
    #[error("transcription failed: {reason}")]
    Transcription { reason: String },

    /// Sink refused the text
    #[error("failed to deliver transcription: {0}")]
    Delivery(String),
}

impl VoiceError {
    /// Transcription failure with a human-readable reason
    #[must_use]
    pub fn transcription(reason: impl Into<String>) -> Self {
        Self::Transcription {
            reason: reason.into(),
        }
    }
}

impl From<CaptureError> for VoiceError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(_) => Self::PermissionDenied,
            CaptureError::UnsupportedFormat(mime) => Self::UnsupportedFormat(mime),
            CaptureError::Unavailable(msg) | CaptureError::Device(msg) => Self::Capture(msg),
        }
    }
}
