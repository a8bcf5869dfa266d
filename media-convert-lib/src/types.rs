use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of media an upload carries; selects the policy table row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Video,
    Document,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Audio,
        MediaKind::Image,
        MediaKind::Video,
        MediaKind::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single upload to convert
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Correlates observer events and log lines for this request
    pub request_id: String,
    pub source_bytes: Bytes,
    pub source_kind: MediaKind,
    pub target_format: String,
    pub original_name: String,
}

impl ConversionRequest {
    pub fn new(
        source_kind: MediaKind,
        source_bytes: impl Into<Bytes>,
        target_format: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            source_bytes: source_bytes.into(),
            source_kind,
            target_format: target_format.into(),
            original_name: original_name.into(),
        }
    }

    /// Target format as matched against the policy table
    pub fn normalized_format(&self) -> String {
        self.target_format.trim().to_ascii_lowercase()
    }

    /// Extension of the uploaded file name including the dot, or `.tmp`
    pub fn source_extension(&self) -> String {
        match self.original_name.rfind('.') {
            Some(idx) if idx + 1 < self.original_name.len() => {
                let ext = &self.original_name[idx..];
                // Only keep simple extensions; anything else would end up in a temp path
                if ext[1..].chars().all(|c| c.is_ascii_alphanumeric()) {
                    ext.to_string()
                } else {
                    ".tmp".to_string()
                }
            }
            _ => ".tmp".to_string(),
        }
    }

    /// `<base>-converted.<format>` where base is the upload name without extension
    pub fn suggested_filename(&self) -> String {
        let name = self.original_name.trim();
        let base = match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        };
        let base = if base.is_empty() { "converted-file" } else { base };
        format!("{}-converted.{}", base, self.normalized_format())
    }
}

/// Byte order of PCM samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endianness {
    Little,
    Big,
}

/// Sample format of a decoded audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormatDescriptor {
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
    pub signed: bool,
    pub endianness: Endianness,
}

impl AudioFormatDescriptor {
    /// Signed 16-bit little-endian PCM, the only layout the container encoder writes
    pub fn pcm16(sample_rate_hz: u32, channel_count: u16) -> Self {
        Self {
            sample_rate_hz,
            channel_count,
            bits_per_sample: 16,
            signed: true,
            endianness: Endianness::Little,
        }
    }
}

/// Interleaved signed 16-bit samples in temporal order
pub type PcmBuffer = Vec<i16>;

/// A finished conversion, ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub suggested_filename: String,
}
