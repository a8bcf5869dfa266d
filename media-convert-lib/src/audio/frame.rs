//! MPEG audio frame headers
//!
//! Parses the 4-byte header that starts every MPEG-1/2/2.5 Layer I/II/III
//! frame and derives the frame length in bytes, so the decoder can slice the
//! stream into whole frames before handing them to the body decoder.
//!
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//! A sync  B version  C layer  D protection  E bitrate  F sample rate
//! G padding  H private  I channel mode  J mode ext  K copyright  L original  M emphasis
//! ```

use std::fmt;

/// Size of a frame header in bytes
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegLayer {
    Layer1,
    Layer2,
    Layer3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

/// Why four bytes are not a usable frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    BadSync,
    ReservedVersion,
    ReservedLayer,
    FreeFormatBitrate,
    BadBitrate,
    ReservedSampleRate,
    ReservedEmphasis,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HeaderError::BadSync => "frame sync not found",
            HeaderError::ReservedVersion => "reserved MPEG version",
            HeaderError::ReservedLayer => "reserved layer",
            HeaderError::FreeFormatBitrate => "free-format bitrate is not supported",
            HeaderError::BadBitrate => "invalid bitrate index",
            HeaderError::ReservedSampleRate => "reserved sample rate index",
            HeaderError::ReservedEmphasis => "reserved emphasis",
        };
        f.write_str(msg)
    }
}

// Bitrates in kbit/s, indexed by the 4-bit bitrate field (0 = free, 15 = bad)
const BITRATES_V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const BITRATES_V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATES_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];
const SAMPLE_RATES_V2: [u32; 3] = [22050, 24000, 16000];
const SAMPLE_RATES_V25: [u32; 3] = [11025, 12000, 8000];

/// A parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    pub has_crc: bool,
    pub bitrate_kbps: u32,
    pub sample_rate_hz: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
}

impl FrameHeader {
    /// Parse a header from the first four bytes of `bytes`.
    ///
    /// Returns `None` if fewer than four bytes are given.
    pub fn parse(bytes: &[u8]) -> Option<Result<Self, HeaderError>> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Some(Self::from_word(word))
    }

    fn from_word(word: u32) -> Result<Self, HeaderError> {
        if word >> 21 != 0x7FF {
            return Err(HeaderError::BadSync);
        }

        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return Err(HeaderError::ReservedVersion),
        };

        let layer = match (word >> 17) & 0b11 {
            0b01 => MpegLayer::Layer3,
            0b10 => MpegLayer::Layer2,
            0b11 => MpegLayer::Layer1,
            _ => return Err(HeaderError::ReservedLayer),
        };

        let has_crc = (word >> 16) & 1 == 0;

        let bitrate_index = ((word >> 12) & 0b1111) as usize;
        if bitrate_index == 0 {
            return Err(HeaderError::FreeFormatBitrate);
        }
        if bitrate_index == 0b1111 {
            return Err(HeaderError::BadBitrate);
        }
        let table = match (version, layer) {
            (MpegVersion::Mpeg1, MpegLayer::Layer1) => &BITRATES_V1_L1,
            (MpegVersion::Mpeg1, MpegLayer::Layer2) => &BITRATES_V1_L2,
            (MpegVersion::Mpeg1, MpegLayer::Layer3) => &BITRATES_V1_L3,
            (_, MpegLayer::Layer1) => &BITRATES_V2_L1,
            (_, _) => &BITRATES_V2_L23,
        };
        let bitrate_kbps = table[bitrate_index];

        let rate_index = ((word >> 10) & 0b11) as usize;
        if rate_index == 0b11 {
            return Err(HeaderError::ReservedSampleRate);
        }
        let sample_rate_hz = match version {
            MpegVersion::Mpeg1 => SAMPLE_RATES_V1[rate_index],
            MpegVersion::Mpeg2 => SAMPLE_RATES_V2[rate_index],
            MpegVersion::Mpeg25 => SAMPLE_RATES_V25[rate_index],
        };

        let padding = (word >> 9) & 1 == 1;

        let channel_mode = match (word >> 6) & 0b11 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        if word & 0b11 == 0b10 {
            return Err(HeaderError::ReservedEmphasis);
        }

        Ok(Self {
            version,
            layer,
            has_crc,
            bitrate_kbps,
            sample_rate_hz,
            padding,
            channel_mode,
        })
    }

    pub fn channel_count(&self) -> u16 {
        match self.channel_mode {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// Total frame length in bytes, header included
    pub fn frame_len(&self) -> usize {
        let bitrate = self.bitrate_kbps * 1000;
        let rate = self.sample_rate_hz;
        let pad = self.padding as u32;
        let len = match (self.layer, self.version) {
            (MpegLayer::Layer1, _) => (12 * bitrate / rate + pad) * 4,
            (MpegLayer::Layer2, _) | (MpegLayer::Layer3, MpegVersion::Mpeg1) => {
                144 * bitrate / rate + pad
            }
            (MpegLayer::Layer3, _) => 72 * bitrate / rate + pad,
        };
        len as usize
    }

    /// Decoded samples per channel in one frame
    pub fn samples_per_frame(&self) -> usize {
        match (self.layer, self.version) {
            (MpegLayer::Layer1, _) => 384,
            (MpegLayer::Layer2, _) | (MpegLayer::Layer3, MpegVersion::Mpeg1) => 1152,
            (MpegLayer::Layer3, _) => 576,
        }
    }
}

/// Length of an ID3v2 tag at the start of `bytes`, footer included.
///
/// `bytes` must hold at least the 10-byte tag header; returns `None` if it is
/// not an ID3v2 tag.
pub fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 10 || &bytes[0..3] != b"ID3" {
        return None;
    }
    // Sync-safe integer: 7 significant bits per byte
    if bytes[6..10].iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b as usize));
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

/// Size of an ID3v1 trailer
pub const ID3V1_LEN: usize = 128;

/// Whether `bytes` is exactly an ID3v1 trailer
pub fn is_id3v1_trailer(bytes: &[u8]) -> bool {
    bytes.len() == ID3V1_LEN && &bytes[0..3] == b"TAG"
}
