//! Synthetic MPEG audio for tests

use crate::audio::frame::FrameHeader;

/// MPEG-1 Layer III, 128 kbps, 44100 Hz, stereo, no CRC (417-byte frames)
pub const STEREO_44K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

/// MPEG-1 Layer III, 64 kbps, 48000 Hz, mono, no CRC (192-byte frames)
pub const MONO_48K: [u8; 4] = [0xFF, 0xFB, 0x54, 0xC0];

/// A frame whose side info and main data are all zero; decodes to silence
pub fn silent_frame(header: [u8; 4]) -> Vec<u8> {
    let parsed = FrameHeader::parse(&header).unwrap().unwrap();
    let mut frame = vec![0u8; parsed.frame_len()];
    frame[..4].copy_from_slice(&header);
    frame
}

pub fn silent_stream(header: [u8; 4], frames: usize) -> Vec<u8> {
    let frame = silent_frame(header);
    let mut out = Vec::with_capacity(frame.len() * frames);
    for _ in 0..frames {
        out.extend_from_slice(&frame);
    }
    out
}
