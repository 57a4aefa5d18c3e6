//! Container format negotiation and the finished audio artifact

/// `WebM` audio
pub const WEBM: &str = "audio/webm";
/// MPEG-4 audio
pub const MP4: &str = "audio/mp4";
/// MPEG audio (MP3)
pub const MPEG: &str = "audio/mpeg";
/// Ogg audio
pub const OGG: &str = "audio/ogg";
/// WAV audio
pub const WAV: &str = "audio/wav";
/// FLAC audio
pub const FLAC: &str = "audio/flac";

/// Formats probed in order before recording starts
pub const PREFERRED_FORMATS: &[&str] = &[WEBM, MP4];

/// Format used when no preferred format is supported
pub const FALLBACK_FORMAT: &str = MPEG;

/// Pick the recording format for a session
///
/// Returns the first entry of `preferences` the runtime supports, or
/// [`FALLBACK_FORMAT`] without probing it.
#[must_use]
pub fn negotiate_format(
    preferences: &[&'static str],
    supports: impl Fn(&str) -> bool,
) -> &'static str {
    preferences
        .iter()
        .copied()
        .find(|mime| supports(mime))
        .unwrap_or(FALLBACK_FORMAT)
}

/// File extension used when uploading audio of the given MIME type
///
/// Parameters such as `;codecs=opus` are ignored. Unknown types map to `webm`.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "audio/mp4" => "m4a",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" => "wav",
        "audio/flac" => "flac",
        _ => "webm",
    }
}

/// Finished recording, ready for a single transcription upload
#[derive(Debug)]
pub struct AudioArtifact {
    bytes: Vec<u8>,
    mime_type: String,
    filename: String,
}

impl AudioArtifact {
    /// Build an artifact tagged with `mime_type`
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let filename = format!("recording.{}", extension_for_mime(&mime_type));
        Self {
            bytes,
            mime_type,
            filename,
        }
    }

    /// Replace the derived upload filename; blank names are ignored
    #[must_use]
    pub fn with_filename(mut self, filename: Option<&str>) -> Self {
        if let Some(name) = filename.map(str::trim).filter(|n| !n.is_empty()) {
            self.filename = name.to_string();
        }
        self
    }

    /// Concatenate flushed recorder chunks into one artifact
    #[must_use]
    pub fn from_chunks(chunks: Vec<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self::new(chunks.concat(), mime_type)
    }

    /// Encoded audio
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type the audio was recorded in
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Upload filename, extension derived from the MIME type unless overridden
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Consume the artifact as `(bytes, mime_type, filename)`
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, String, String) {
        (self.bytes, self.mime_type, self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(extension_for_mime(WEBM), "webm");
        assert_eq!(extension_for_mime(MP4), "m4a");
        assert_eq!(extension_for_mime(MPEG), "mp3");
        assert_eq!(extension_for_mime(OGG), "ogg");
        assert_eq!(extension_for_mime(WAV), "wav");
        assert_eq!(extension_for_mime(FLAC), "flac");
    }

    #[test]
    fn test_unknown_mime_defaults_to_webm() {
        assert_eq!(extension_for_mime("audio/x-unknown"), "webm");
        assert_eq!(extension_for_mime(""), "webm");
        assert_eq!(extension_for_mime("video/mp4"), "webm");
    }

    #[test]
    fn test_mime_parameters_ignored() {
        assert_eq!(extension_for_mime("audio/mp4;codecs=mp4a.40.2"), "m4a");
        assert_eq!(extension_for_mime("Audio/OGG; codecs=opus"), "ogg");
    }

    #[test]
    fn test_negotiation_prefers_webm() {
        assert_eq!(negotiate_format(PREFERRED_FORMATS, |_| true), WEBM);
    }

    #[test]
    fn test_negotiation_falls_through_to_mp4() {
        assert_eq!(negotiate_format(PREFERRED_FORMATS, |m| m == MP4), MP4);
    }

    #[test]
    fn test_negotiation_fallback_is_unprobed() {
        assert_eq!(negotiate_format(PREFERRED_FORMATS, |_| false), MPEG);
        assert_eq!(negotiate_format(&[], |_| true), MPEG);
    }

    #[test]
    fn test_artifact_filename_matches_mime() {
        let artifact = AudioArtifact::from_chunks(vec![vec![1, 2], vec![3]], MP4);
        assert_eq!(artifact.bytes(), &[1, 2, 3]);
        assert_eq!(artifact.filename(), "recording.m4a");
        assert_eq!(artifact.mime_type(), MP4);
    }

    #[test]
    fn test_explicit_filename_kept() {
        let artifact = AudioArtifact::new(vec![1], "application/octet-stream")
            .with_filename(Some("clip.m4a"));
        assert_eq!(artifact.filename(), "clip.m4a");

        let artifact = AudioArtifact::new(vec![1], MPEG).with_filename(Some("  "));
        assert_eq!(artifact.filename(), "recording.mp3");

        let artifact = AudioArtifact::new(vec![1], OGG).with_filename(None);
        assert_eq!(artifact.filename(), "recording.ogg");
    }
}
