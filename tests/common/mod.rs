//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatvoice::voice::{
    CaptureBackend, CaptureError, CaptureMode, CaptureRequest, CaptureStream, TranscriptionClient,
};
use chatvoice::{ApiBase, TranscriptSink};

/// Origin used by tests
pub const TEST_ORIGIN: &str = "http://localhost:3000";

/// Resolve an API base pointing at a mock server
pub fn api_base(uri: &str) -> ApiBase {
    ApiBase::resolve(Some(uri), false, TEST_ORIGIN).expect("failed to resolve api base")
}

/// Transcription client pointing at a mock server
pub fn transcriber(uri: &str) -> TranscriptionClient {
    TranscriptionClient::new(&api_base(uri), "whisper-1", Duration::from_secs(5))
        .expect("failed to build transcription client")
}

/// Capture backend with scripted grants and counted releases
pub struct FakeCapture {
    allow_combined: bool,
    allow_mic: bool,
    formats: Vec<&'static str>,
    payload: Vec<u8>,
    fail_start: bool,
    fail_flush: bool,
    pub requests: Mutex<Vec<CaptureRequest>>,
    pub released: Arc<AtomicUsize>,
    pub started_with: Arc<Mutex<Vec<String>>>,
}

impl FakeCapture {
    pub fn new(allow_combined: bool, allow_mic: bool) -> Self {
        Self {
            allow_combined,
            allow_mic,
            formats: vec!["audio/webm"],
            payload: b"fake-audio".to_vec(),
            fail_start: false,
            fail_flush: false,
            requests: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
            started_with: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Formats the fake recorder can encode
    pub fn with_formats(mut self, formats: &[&'static str]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Recorder refuses to start after the device is granted
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Recorder fails while flushing the final chunks
    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn request_modes(&self) -> Vec<CaptureMode> {
        self.requests.lock().unwrap().iter().map(|r| r.mode).collect()
    }
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    async fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.requests.lock().unwrap().push(request);

        let granted = match request.mode {
            CaptureMode::MicAndSystem => self.allow_combined,
            CaptureMode::Mic => self.allow_mic,
        };
        if !granted {
            return Err(CaptureError::PermissionDenied("denied by test".to_string()));
        }

        Ok(Box::new(FakeStream {
            payload: self.payload.clone(),
            fail_start: self.fail_start,
            fail_flush: self.fail_flush,
            released: Arc::clone(&self.released),
            started_with: Arc::clone(&self.started_with),
        }))
    }

    fn supports_format(&self, mime_type: &str) -> bool {
        self.formats.contains(&mime_type)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeStream {
    payload: Vec<u8>,
    fail_start: bool,
    fail_flush: bool,
    released: Arc<AtomicUsize>,
    started_with: Arc<Mutex<Vec<String>>>,
}

impl CaptureStream for FakeStream {
    fn start(&mut self, mime_type: &str) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Device("recorder refused to start".to_string()));
        }
        self.started_with.lock().unwrap().push(mime_type.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        if self.fail_flush {
            return Err(CaptureError::Device("recorder lost final chunk".to_string()));
        }
        let (head, tail) = self.payload.split_at(self.payload.len() / 2);
        Ok(vec![head.to_vec(), tail.to_vec()])
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink that records every delivered transcript
#[derive(Default)]
pub struct RecordingSink {
    pub texts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            texts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptSink for RecordingSink {
    async fn on_transcription_complete(&self, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("composer unavailable");
        }
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
