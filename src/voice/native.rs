//! Native capture backend using cpal, recording to WAV
//!
//! Combined capture pairs the default microphone with a loopback/monitor input
//! (e.g. a `PulseAudio` "Monitor of ..." source). Hosts without one report the
//! combined request as unavailable, which makes the pipeline fall back to the
//! microphone. cpal streams are not `Send`, so each acquisition owns a capture
//! thread that holds the streams until the device is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::capture::{CaptureBackend, CaptureError, CaptureMode, CaptureRequest, CaptureStream};
use super::encoding::{MP4, WAV, WEBM};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Preference list for this backend: the browser formats first, then WAV
pub const NATIVE_FORMATS: &[&str] = &[WEBM, MP4, WAV];

/// Input device name fragments that identify a loopback source
const LOOPBACK_HINTS: &[&str] = &["monitor", "loopback", "stereo mix"];

type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// Microphone and loopback capture through the default cpal host
#[derive(Debug, Default)]
pub struct NativeCapture;

impl NativeCapture {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureBackend for NativeCapture {
    async fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let stream = tokio::task::spawn_blocking(move || NativeStream::open(request))
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))??;
        Ok(Box::new(stream))
    }

    fn supports_format(&self, mime_type: &str) -> bool {
        mime_type == WAV
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// Open capture devices, owned by a dedicated thread
struct NativeStream {
    mic: SampleBuffer,
    system: Option<SampleBuffer>,
    recording: Arc<AtomicBool>,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl NativeStream {
    fn open(request: CaptureRequest) -> Result<Self, CaptureError> {
        let mic: SampleBuffer = Arc::new(Mutex::new(Vec::new()));
        let system = (request.mode == CaptureMode::MicAndSystem)
            .then(|| Arc::new(Mutex::new(Vec::new())));
        let recording = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = {
            let mic = Arc::clone(&mic);
            let system = system.clone();
            let recording = Arc::clone(&recording);
            std::thread::Builder::new()
                .name("chatvoice-capture".to_string())
                .spawn(move || match open_streams(&mic, system.as_ref(), &recording) {
                    Ok(streams) => {
                        let _ = ready_tx.send(Ok(()));
                        // Block until released; dropping the streams frees the devices
                        let _ = stop_rx.recv();
                        drop(streams);
                        tracing::debug!("capture streams closed");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                })
                .map_err(|e| CaptureError::Device(e.to_string()))?
        };

        let opened = ready_rx
            .recv()
            .map_err(|_| CaptureError::Device("capture thread exited".to_string()))
            .and_then(|r| r);

        if let Err(e) = opened {
            let _ = thread.join();
            return Err(e);
        }

        tracing::debug!(mode = %request.mode, "capture devices opened");

        Ok(Self {
            mic,
            system,
            recording,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl CaptureStream for NativeStream {
    fn start(&mut self, mime_type: &str) -> Result<(), CaptureError> {
        if mime_type != WAV {
            return Err(CaptureError::UnsupportedFormat(mime_type.to_string()));
        }
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        self.recording.store(false, Ordering::SeqCst);

        let mic = take_samples(&self.mic);
        let samples = match &self.system {
            Some(system) => mix(&mic, &take_samples(system)),
            None => mic,
        };

        tracing::debug!(samples = samples.len(), "flushing recording");
        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        Ok(vec![wav])
    }

    fn release(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_streams(
    mic: &SampleBuffer,
    system: Option<&SampleBuffer>,
    recording: &Arc<AtomicBool>,
) -> Result<Vec<Stream>, CaptureError> {
    let host = cpal::default_host();
    let mut streams = Vec::with_capacity(2);

    if let Some(system) = system {
        let device = find_loopback_device(&host)?;
        streams.push(build_stream(&device, system, recording)?);
    }

    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::PermissionDenied("no input device available".to_string()))?;
    streams.push(build_stream(&device, mic, recording)?);

    Ok(streams)
}

fn find_loopback_device(host: &cpal::Host) -> Result<Device, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Device(e.to_string()))?;

    for device in devices {
        let name = device.name().unwrap_or_default().to_lowercase();
        if LOOPBACK_HINTS.iter().any(|hint| name.contains(hint)) {
            tracing::debug!(device = %name, "found loopback input");
            return Ok(device);
        }
    }

    Err(CaptureError::Unavailable("no loopback input device".to_string()))
}

/// Pick a 16kHz input config, preferring mono
fn input_config(device: &Device) -> Result<StreamConfig, CaptureError> {
    let supported = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Device(e.to_string()))?
        .filter(|c| {
            c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| CaptureError::Device("no suitable audio config found".to_string()))?;

    Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
}

fn build_stream(
    device: &Device,
    buffer: &SampleBuffer,
    recording: &Arc<AtomicBool>,
) -> Result<Stream, CaptureError> {
    let config = input_config(device)?;
    let channels = usize::from(config.channels.max(1));
    let buffer = Arc::clone(buffer);
    let recording = Arc::clone(recording);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !recording.load(Ordering::Relaxed) {
                    return;
                }
                if let Ok(mut buf) = buffer.lock() {
                    push_mono(&mut buf, data, channels);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::Device(e.to_string()))?;

    tracing::debug!(
        device = %device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels,
        "audio stream started"
    );

    Ok(stream)
}

fn take_samples(buffer: &SampleBuffer) -> Vec<f32> {
    buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default()
}

/// Append interleaved frames averaged down to mono
#[allow(clippy::cast_precision_loss)]
fn push_mono(out: &mut Vec<f32>, data: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(data);
        return;
    }
    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Sum two mono tracks, padding the shorter one with silence
fn mix(a: &[f32], b: &[f32]) -> Vec<f32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let sum = a.get(i).copied().unwrap_or(0.0) + b.get(i).copied().unwrap_or(0.0);
            sum.clamp(-1.0, 1.0)
        })
        .collect()
}

/// Convert f32 samples to mono 16-bit WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| CaptureError::Device(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
