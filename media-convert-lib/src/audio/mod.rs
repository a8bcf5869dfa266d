//! In-process audio conversion: MPEG audio frames to a WAV container

pub mod decoder;
pub mod frame;
pub mod wav;

use std::io::Read;

use tokio_util::sync::CancellationToken;

use crate::error::{ConversionError, Result};
use crate::types::{AudioFormatDescriptor, PcmBuffer};

pub use decoder::{decode, DecodedFrame, FrameDecoder};

/// Decode every frame of `source` into one interleaved buffer.
///
/// Returns the buffer, the stream format (`None` if there were no frames) and
/// the number of frames decoded.
pub fn decode_all<R: Read>(
    source: R,
    cancel: Option<&CancellationToken>,
) -> Result<(PcmBuffer, Option<AudioFormatDescriptor>, u64)> {
    let mut decoder = decode(source);
    if let Some(cancel) = cancel {
        decoder = decoder.with_cancellation(cancel.clone());
    }

    let mut pcm = PcmBuffer::new();
    for frame in decoder.by_ref() {
        pcm.extend_from_slice(&frame?.samples);
    }
    Ok((pcm, decoder.format(), decoder.frames_decoded()))
}

/// Decode `source` and wrap the samples in a WAV file
pub fn mpeg_to_wav<R: Read>(source: R, cancel: Option<&CancellationToken>) -> Result<Vec<u8>> {
    let (pcm, format, frames) = decode_all(source, cancel)?;
    let format = format.ok_or_else(|| {
        ConversionError::Encoding("no decodable audio frames in source".into())
    })?;
    tracing::debug!(frames, samples = pcm.len(), "decoded audio stream");
    wav::encode(&pcm, &format)
}
