//! RIFF/WAVE container for decoded PCM
//!
//! Output is always the canonical 44-byte header followed by signed 16-bit
//! little-endian samples, as written by `hound`.

use std::io::Cursor;

use crate::error::{ConversionError, Result};
use crate::types::AudioFormatDescriptor;

/// Size of the canonical RIFF/WAVE header written by [`encode`]
pub const HEADER_LEN: usize = 44;

/// Wrap interleaved samples in a WAV container.
///
/// Fails with `Encoding` when there is nothing to write or when the sample
/// count does not divide evenly across channels.
pub fn encode(samples: &[i16], format: &AudioFormatDescriptor) -> Result<Vec<u8>> {
    if samples.is_empty() {
        return Err(ConversionError::Encoding(
            "no decodable audio frames in source".into(),
        ));
    }
    if format.channel_count == 0 || format.bits_per_sample != 16 || !format.signed {
        return Err(ConversionError::Encoding(format!(
            "unsupported sample layout: {} channels, {} bits, signed={}",
            format.channel_count, format.bits_per_sample, format.signed
        )));
    }
    if samples.len() % format.channel_count as usize != 0 {
        return Err(ConversionError::Encoding(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            format.channel_count
        )));
    }

    let spec = hound::WavSpec {
        channels: format.channel_count,
        sample_rate: format.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut out = Cursor::new(Vec::with_capacity(HEADER_LEN + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut out, spec)?;
        let mut pcm = writer.get_i16_writer(samples.len() as u32);
        for &sample in samples {
            pcm.write_sample(sample);
        }
        pcm.flush()?;
        writer.finalize()?;
    }

    let bytes = out.into_inner();
    tracing::debug!(
        samples = samples.len(),
        sample_rate = format.sample_rate_hz,
        channels = format.channel_count,
        bytes = bytes.len(),
        "encoded WAV container"
    );
    Ok(bytes)
}

/// Read back the format and sample count (per channel) of a WAV file
pub fn probe(bytes: &[u8]) -> Result<(AudioFormatDescriptor, u32)> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let descriptor = AudioFormatDescriptor::pcm16(spec.sample_rate, spec.channels);
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(ConversionError::Encoding(format!(
            "not 16-bit integer PCM: {} bits",
            spec.bits_per_sample
        )));
    }
    Ok((descriptor, reader.duration()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let format = AudioFormatDescriptor::pcm16(44100, 2);
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 7];
        let bytes = encode(&samples, &format).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + samples.len() * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(&bytes[36..40], b"data");

        let riff_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_len as usize, bytes.len() - 8);
        let channels = u16::from_le_bytes(bytes[22..24].try_into().unwrap());
        assert_eq!(channels, 2);
        let rate = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
        assert_eq!(rate, 44100);
        let byte_rate = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        assert_eq!(byte_rate, 44100 * 4);
        let data_len = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_len as usize, samples.len() * 2);

        // Little-endian sample payload
        assert_eq!(&bytes[46..48], &1i16.to_le_bytes());
        assert_eq!(&bytes[50..52], &i16::MAX.to_le_bytes());
    }

    #[test]
    fn test_probe_round_trip() {
        let format = AudioFormatDescriptor::pcm16(22050, 1);
        let bytes = encode(&[5, 6, 7], &format).unwrap();
        let (probed, frames) = probe(&bytes).unwrap();
        assert_eq!(probed, format);
        assert_eq!(frames, 3);
    }

    #[test]
    fn test_empty_is_encoding_error() {
        let err = encode(&[], &AudioFormatDescriptor::pcm16(44100, 2)).unwrap_err();
        assert_eq!(err.kind(), "encoding");
    }

    #[test]
    fn test_ragged_channels_rejected() {
        let err = encode(&[1, 2, 3], &AudioFormatDescriptor::pcm16(44100, 2)).unwrap_err();
        assert!(matches!(err, ConversionError::Encoding(_)));
    }

    #[test]
    fn test_probe_garbage() {
        assert!(probe(b"definitely not a wav file").is_err());
    }
}
