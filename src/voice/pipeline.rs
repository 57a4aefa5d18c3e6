//! Record/transcribe cycle driven by a single start/stop control
//!
//! ```text
//! Idle ──start──▶ Acquiring ──▶ Recording ──stop──▶ Stopping ──▶ Idle
//!                                                      │
//!                                                      ▼
//!                                  Transcribing ──▶ deliver text ──▶ Idle
//! ```
//!
//! Transcription runs in the background so a new recording can start while the
//! previous one is still uploading. Uploads are serialized, so at most one is in
//! flight, and the capture device is always released before the upload begins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::capture::{AcquiredDevice, CaptureBackend, CaptureMode, acquire_with_fallback};
use super::encoding::{AudioArtifact, PREFERRED_FORMATS, negotiate_format};
use super::stt::TranscriptionClient;
use super::ticker::{ElapsedTicker, format_elapsed};
use super::VoiceError;

/// Default minimum time the transcribing indicator stays visible
pub const MIN_INDICATOR: Duration = Duration::from_millis(500);

/// Observable pipeline state for the chat surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStatus {
    pub is_recording: bool,
    pub is_transcribing: bool,
    pub elapsed_seconds: u64,
    pub capture_mode: CaptureMode,
}

impl VoiceStatus {
    /// Timer badge text (`m:ss`), shown while recording
    #[must_use]
    pub fn timer(&self) -> Option<String> {
        self.is_recording.then(|| format_elapsed(self.elapsed_seconds))
    }

    /// Capture-mode badge (`"Mic + System"`), shown while recording combined audio
    #[must_use]
    pub const fn mode_label(&self) -> Option<&'static str> {
        if self.is_recording {
            self.capture_mode.label()
        } else {
            None
        }
    }
}

/// Receives the text of a finished transcription
///
/// Called once per recording. Implementations typically insert the text into the
/// message composer and may move input focus there.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Deliver transcribed text
    ///
    /// # Errors
    ///
    /// Returns error if the text could not be delivered; the transcription is not retried
    async fn on_transcription_complete(&self, text: &str) -> anyhow::Result<()>;
}

/// Result of the start/stop control
#[derive(Debug)]
pub enum Toggle {
    /// Recording started in the given mode
    Started(CaptureMode),
    /// Recording stopped; its transcription is running
    Stopped(PendingTranscription),
}

/// Outcome of one background transcription
#[derive(Debug)]
pub struct PendingTranscription {
    handle: JoinHandle<Result<String, VoiceError>>,
}

impl PendingTranscription {
    /// Wait for the transcription and delivery to finish
    ///
    /// # Errors
    ///
    /// Returns the transcription or delivery failure
    pub async fn wait(self) -> Result<String, VoiceError> {
        self.handle
            .await
            .map_err(|e| VoiceError::transcription(format!("transcription task failed: {e}")))?
    }
}

/// State held between start and stop
struct RecordingSession {
    started_at: DateTime<Utc>,
    capture_mode: CaptureMode,
    mime_type: &'static str,
    device: AcquiredDevice,
    ticker: ElapsedTicker,
}

/// Marks the transcribing indicator for as long as it is alive
struct TranscribingGuard {
    status: Arc<watch::Sender<VoiceStatus>>,
    pending: Arc<AtomicUsize>,
}

impl TranscribingGuard {
    fn enter(status: &Arc<watch::Sender<VoiceStatus>>, pending: &Arc<AtomicUsize>) -> Self {
        status.send_modify(|s| {
            pending.fetch_add(1, Ordering::SeqCst);
            s.is_transcribing = true;
        });
        Self {
            status: Arc::clone(status),
            pending: Arc::clone(pending),
        }
    }
}

impl Drop for TranscribingGuard {
    fn drop(&mut self) {
        let pending = &self.pending;
        self.status.send_modify(|s| {
            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                s.is_transcribing = false;
            }
        });
    }
}

/// Voice capture → transcription → text delivery
pub struct VoicePipeline {
    capture: Arc<dyn CaptureBackend>,
    transcriber: Arc<TranscriptionClient>,
    sink: Arc<dyn TranscriptSink>,
    preferences: Vec<&'static str>,
    min_indicator: Duration,
    status: Arc<watch::Sender<VoiceStatus>>,
    cycle: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
    upload_lane: Arc<Mutex<()>>,
    session: Mutex<Option<RecordingSession>>,
}

impl VoicePipeline {
    /// Create a pipeline with the default format preferences
    #[must_use]
    pub fn new(
        capture: Arc<dyn CaptureBackend>,
        transcriber: TranscriptionClient,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        let (status, _) = watch::channel(VoiceStatus::default());
        Self {
            capture,
            transcriber: Arc::new(transcriber),
            sink,
            preferences: PREFERRED_FORMATS.to_vec(),
            min_indicator: MIN_INDICATOR,
            status: Arc::new(status),
            cycle: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
            upload_lane: Arc::new(Mutex::new(())),
            session: Mutex::new(None),
        }
    }

    /// Override the ordered list of formats probed before recording
    #[must_use]
    pub fn with_preferences(mut self, preferences: &[&'static str]) -> Self {
        self.preferences = preferences.to_vec();
        self
    }

    /// Override how long the transcribing indicator stays visible at minimum
    #[must_use]
    pub const fn with_min_indicator(mut self, min_indicator: Duration) -> Self {
        self.min_indicator = min_indicator;
        self
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> VoiceStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<VoiceStatus> {
        self.status.subscribe()
    }

    /// When the active recording started
    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        self.session.lock().await.as_ref().map(|s| s.started_at)
    }

    /// The start/stop control: stop the active recording, or start one
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot be acquired or the recording cannot be flushed
    pub async fn start_stop_recording(&self) -> Result<Toggle, VoiceError> {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(active) => self.finish(active).map(Toggle::Stopped),
            None => {
                let started = self.begin().await?;
                let mode = started.capture_mode;
                *session = Some(started);
                Ok(Toggle::Started(mode))
            }
        }
    }

    /// Start recording
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::AlreadyRecording`] if a recording is active, or
    /// [`VoiceError::PermissionDenied`] if no capture could be acquired
    pub async fn start(&self) -> Result<CaptureMode, VoiceError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(VoiceError::AlreadyRecording);
        }
        let started = self.begin().await?;
        let mode = started.capture_mode;
        *session = Some(started);
        Ok(mode)
    }

    /// Stop recording and start its transcription
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::NotRecording`] if nothing is being recorded
    pub async fn stop(&self) -> Result<PendingTranscription, VoiceError> {
        let active = self
            .session
            .lock()
            .await
            .take()
            .ok_or(VoiceError::NotRecording)?;
        self.finish(active)
    }

    async fn begin(&self) -> Result<RecordingSession, VoiceError> {
        let (mut device, capture_mode) = acquire_with_fallback(self.capture.as_ref()).await?;

        let mime_type = negotiate_format(&self.preferences, |m| self.capture.supports_format(m));
        tracing::info!(mime_type, mode = %capture_mode, "using MIME type");

        // Dropping the device on failure releases it
        device.start(mime_type)?;

        let mut cycle_id = 0;
        self.status.send_modify(|s| {
            cycle_id = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
            s.is_recording = true;
            s.elapsed_seconds = 0;
            s.capture_mode = capture_mode;
        });

        let status = Arc::clone(&self.status);
        let cycle = Arc::clone(&self.cycle);
        let ticker = ElapsedTicker::start(move |elapsed| {
            status.send_if_modified(|s| {
                let current = s.is_recording && cycle.load(Ordering::SeqCst) == cycle_id;
                if current {
                    s.elapsed_seconds = elapsed;
                }
                current
            });
        });

        Ok(RecordingSession {
            started_at: Utc::now(),
            capture_mode,
            mime_type,
            device,
            ticker,
        })
    }

    fn finish(&self, session: RecordingSession) -> Result<PendingTranscription, VoiceError> {
        let RecordingSession {
            started_at,
            capture_mode,
            mime_type,
            device,
            ticker,
        } = session;

        drop(ticker);
        self.status.send_modify(|s| {
            s.is_recording = false;
            s.elapsed_seconds = 0;
        });

        // Releases the device before anything is uploaded
        let chunks = device.finish()?;
        let artifact = AudioArtifact::from_chunks(chunks, mime_type);

        #[allow(clippy::cast_precision_loss)]
        let duration_secs = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;
        tracing::info!(
            mime_type,
            mode = %capture_mode,
            duration_secs,
            bytes = artifact.bytes().len(),
            "recording completed"
        );

        Ok(self.spawn_transcription(artifact))
    }

    fn spawn_transcription(&self, artifact: AudioArtifact) -> PendingTranscription {
        let guard = TranscribingGuard::enter(&self.status, &self.pending);
        let transcriber = Arc::clone(&self.transcriber);
        let sink = Arc::clone(&self.sink);
        let lane = Arc::clone(&self.upload_lane);
        let min_indicator = self.min_indicator;

        let handle = tokio::spawn(async move {
            let shown_at = tokio::time::Instant::now();

            let outcome: Result<String, VoiceError> = async {
                let text = {
                    let _lane = lane.lock().await;
                    transcriber.transcribe(artifact).await?
                };
                sink.on_transcription_complete(&text)
                    .await
                    .map_err(|e| VoiceError::Delivery(e.to_string()))?;
                Ok(text)
            }
            .await;

            if let Err(e) = &outcome {
                tracing::error!(error = %e, "error transcribing audio");
            }

            if let Some(rest) = min_indicator.checked_sub(shown_at.elapsed()) {
                tokio::time::sleep(rest).await;
            }
            drop(guard);

            outcome
        });

        PendingTranscription { handle }
    }
}
