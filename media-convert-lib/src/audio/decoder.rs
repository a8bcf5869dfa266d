//! Frame-by-frame MPEG audio decoder
//!
//! [`FrameDecoder`] is a pull-based, non-restartable iterator over a
//! compressed byte stream. Each step locates the next frame header at the
//! read cursor, checks that the whole frame is present, decodes its body with
//! symphonia's MPEG audio decoder and yields interleaved signed 16-bit
//! samples.
//!
//! The stream is strict: anything at the cursor that is not a frame header
//! (or the ID3 tags around the audio) fails the decode with
//! `CorruptStream` at that byte offset. Frames are never skipped, so a damaged
//! file can not turn into a silently shortened one.
//!
//! The [`AudioFormatDescriptor`] is taken from the first decoded frame and
//! reused for every later frame. A stream that changes sample rate or channel
//! layout part way through is undefined behaviour of the source format: the
//! body decoder rejects such a frame (surfacing as `CorruptStream`) and no
//! attempt is made to resample or re-describe it.

use std::io::{ErrorKind, Read};

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3,
};
use symphonia::core::formats::Packet;
use tokio_util::sync::CancellationToken;

use super::frame::{id3v2_len, is_id3v1_trailer, FrameHeader, MpegLayer, HEADER_LEN, ID3V1_LEN};
use crate::error::{ConversionError, Result};
use crate::types::AudioFormatDescriptor;

const READ_CHUNK: usize = 16 * 1024;

/// One decoded frame
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Byte offset of the frame header in the source stream
    pub offset: u64,
    /// Interleaved samples, `samples.len() / channel_count` per channel
    pub samples: Vec<i16>,
    /// Format established by the first frame of the stream
    pub format: AudioFormatDescriptor,
}

/// Start decoding `source`. Nothing is read until the first `next()`.
pub fn decode<R: Read>(source: R) -> FrameDecoder<R> {
    FrameDecoder::new(source)
}

pub struct FrameDecoder<R> {
    reader: R,
    /// Bytes read but not yet consumed; `buf[0]` sits at stream offset `offset`
    buf: Vec<u8>,
    offset: u64,
    reader_done: bool,
    started: bool,
    finished: bool,
    codec: Option<Box<dyn Decoder>>,
    format: Option<AudioFormatDescriptor>,
    frames: u64,
    cancel: Option<CancellationToken>,
}

impl<R: Read> FrameDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            offset: 0,
            reader_done: false,
            started: false,
            finished: false,
            codec: None,
            format: None,
            frames: 0,
            cancel: None,
        }
    }

    /// Check `cancel` between frames; a cancelled token ends the stream with `Cancelled`
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Format of the stream, known once the first frame has been decoded
    pub fn format(&self) -> Option<AudioFormatDescriptor> {
        self.format
    }

    /// Number of frames decoded so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    /// Read until at least `want` bytes are buffered or the source is exhausted
    fn fill(&mut self, want: usize) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.buf.len() < want && !self.reader_done {
            match self.reader.read(&mut chunk) {
                Ok(0) => self.reader_done = true,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConversionError::resource("reading compressed audio", e)),
            }
        }
        Ok(())
    }

    fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
        self.offset += n as u64;
    }

    fn corrupt(&self, offset: u64, reason: impl Into<String>) -> ConversionError {
        ConversionError::CorruptStream {
            offset,
            reason: reason.into(),
        }
    }

    /// Skip a leading ID3v2 tag, if there is one
    fn skip_id3v2(&mut self) -> Result<()> {
        self.fill(10)?;
        if let Some(len) = id3v2_len(&self.buf) {
            self.fill(len)?;
            if self.buf.len() < len {
                let end = self.offset + self.buf.len() as u64;
                return Err(self.corrupt(end, format!("ID3v2 tag truncated: expected {} bytes", len)));
            }
            tracing::trace!(len, "skipping ID3v2 tag");
            self.consume(len);
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if !self.started {
            self.started = true;
            self.skip_id3v2()?;
        }

        self.fill(HEADER_LEN)?;
        if self.buf.is_empty() {
            return Ok(None);
        }

        if self.buf.starts_with(b"TAG") {
            self.fill(ID3V1_LEN + 1)?;
            if self.reader_done && is_id3v1_trailer(&self.buf) {
                self.consume(ID3V1_LEN);
                return Ok(None);
            }
        }

        let header = match FrameHeader::parse(&self.buf) {
            Some(Ok(header)) => header,
            Some(Err(e)) => return Err(self.corrupt(self.offset, e.to_string())),
            None => {
                let end = self.offset + self.buf.len() as u64;
                return Err(self.corrupt(end, "stream ends inside a frame header"));
            }
        };

        let frame_len = header.frame_len();
        self.fill(frame_len)?;
        if self.buf.len() < frame_len {
            let end = self.offset + self.buf.len() as u64;
            return Err(self.corrupt(
                end,
                format!(
                    "frame at offset {} truncated: expected {} bytes, found {}",
                    self.offset,
                    frame_len,
                    self.buf.len()
                ),
            ));
        }

        if self.codec.is_none() {
            self.codec = Some(open_codec(&header)?);
        }

        let frame_offset = self.offset;
        let samples_per_frame = header.samples_per_frame() as u64;
        let (samples, spec) = {
            let codec = match self.codec.as_mut() {
                Some(codec) => codec,
                None => return Err(ConversionError::Encoding("frame decoder not initialised".into())),
            };
            let packet = Packet::new_from_slice(
                0,
                self.frames * samples_per_frame,
                samples_per_frame,
                &self.buf[..frame_len],
            );
            let decoded = codec.decode(&packet).map_err(|e| ConversionError::CorruptStream {
                offset: frame_offset,
                reason: format!("frame body could not be decoded: {}", e),
            })?;

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            (sample_buf.samples().to_vec(), spec)
        };

        let format = *self.format.get_or_insert_with(|| {
            AudioFormatDescriptor::pcm16(spec.rate, spec.channels.count() as u16)
        });
        if self.frames == 0 {
            tracing::debug!(
                sample_rate = format.sample_rate_hz,
                channels = format.channel_count,
                layer = ?header.layer,
                version = ?header.version,
                bitrate_kbps = header.bitrate_kbps,
                "audio stream format established"
            );
        }

        self.consume(frame_len);
        self.frames += 1;

        Ok(Some(DecodedFrame {
            offset: frame_offset,
            samples,
            format,
        }))
    }
}

impl<R: Read> Iterator for FrameDecoder<R> {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            self.finished = true;
            return Some(Err(ConversionError::Cancelled));
        }

        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                tracing::trace!(frames = self.frames, bytes = self.offset, "end of audio stream");
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for FrameDecoder<R> {}

fn open_codec(header: &FrameHeader) -> Result<Box<dyn Decoder>> {
    let codec_type = match header.layer {
        MpegLayer::Layer1 => CODEC_TYPE_MP1,
        MpegLayer::Layer2 => CODEC_TYPE_MP2,
        MpegLayer::Layer3 => CODEC_TYPE_MP3,
    };
    let channels = if header.channel_count() == 1 {
        Channels::FRONT_LEFT
    } else {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    };

    let mut params = CodecParameters::new();
    params
        .for_codec(codec_type)
        .with_sample_rate(header.sample_rate_hz)
        .with_channels(channels);

    symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| ConversionError::Encoding(format!("no decoder for {:?}: {}", header.layer, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{silent_frame, silent_stream, MONO_48K, STEREO_44K};
    use std::io::Cursor;

    #[test]
    fn test_yields_one_element_per_frame() {
        let stream = silent_stream(STEREO_44K, 3);
        let frames: Vec<_> = decode(Cursor::new(stream)).collect::<Result<_>>().unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].offset, 0);
        assert_eq!(frames[1].offset, 417);
        assert_eq!(frames[2].offset, 834);
        for frame in &frames {
            assert_eq!(frame.format, AudioFormatDescriptor::pcm16(44100, 2));
            assert_eq!(frame.samples.len(), 1152 * 2);
            assert!(frame.samples.iter().all(|s| *s == 0));
        }
    }

    #[test]
    fn test_mono_stream() {
        let stream = silent_stream(MONO_48K, 2);
        let mut decoder = decode(Cursor::new(stream));
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.format.sample_rate_hz, 48000);
        assert_eq!(first.format.channel_count, 1);
        assert_eq!(first.samples.len(), 1152);
        assert!(decoder.next().unwrap().is_ok());
        assert!(decoder.next().is_none());
        assert_eq!(decoder.frames_decoded(), 2);
    }

    #[test]
    fn test_empty_stream_ends_cleanly() {
        let mut decoder = decode(Cursor::new(Vec::<u8>::new()));
        assert!(decoder.next().is_none());
        assert!(decoder.format().is_none());
    }

    #[test]
    fn test_truncated_frame_reports_truncation_offset() {
        let mut stream = silent_stream(STEREO_44K, 2);
        stream.truncate(417 + 200);

        let results: Vec<_> = decode(Cursor::new(stream)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(ConversionError::CorruptStream { offset, .. }) => assert_eq!(*offset, 617),
            other => panic!("expected corrupt stream, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_header_reports_truncation_offset() {
        let mut stream = silent_stream(STEREO_44K, 1);
        stream.extend_from_slice(&[0xFF, 0xFB]);

        let results: Vec<_> = decode(Cursor::new(stream)).collect();
        match results.last() {
            Some(Err(ConversionError::CorruptStream { offset, .. })) => assert_eq!(*offset, 419),
            other => panic!("expected corrupt stream, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_between_frames_is_not_skipped() {
        let mut stream = silent_frame(STEREO_44K);
        stream.extend_from_slice(b"junk");
        stream.extend_from_slice(&silent_frame(STEREO_44K));

        let mut decoder = decode(Cursor::new(stream));
        assert!(decoder.next().unwrap().is_ok());
        match decoder.next() {
            Some(Err(ConversionError::CorruptStream { offset, reason })) => {
                assert_eq!(offset, 417);
                assert!(reason.contains("sync"));
            }
            other => panic!("expected corrupt stream, got {other:?}"),
        }
        // Fused after the error
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_format_change_is_corrupt() {
        let mut stream = silent_frame(STEREO_44K);
        stream.extend_from_slice(&silent_frame(MONO_48K));

        let mut decoder = decode(Cursor::new(stream));
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.format, AudioFormatDescriptor::pcm16(44100, 2));
        match decoder.next() {
            Some(Err(ConversionError::CorruptStream { offset, .. })) => assert_eq!(offset, 417),
            other => panic!("expected corrupt stream, got {other:?}"),
        }
        assert!(decoder.next().is_none());
        assert_eq!(decoder.format(), Some(AudioFormatDescriptor::pcm16(44100, 2)));
    }

    #[test]
    fn test_skips_id3_tags() {
        let mut stream = b"ID3\x03\x00\x00\x00\x00\x00\x05".to_vec();
        stream.extend_from_slice(&[0u8; 5]);
        stream.extend_from_slice(&silent_stream(STEREO_44K, 2));
        let mut trailer = vec![0u8; ID3V1_LEN];
        trailer[..3].copy_from_slice(b"TAG");
        stream.extend_from_slice(&trailer);

        let frames: Vec<_> = decode(Cursor::new(stream)).collect::<Result<_>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].offset, 15);
    }

    #[test]
    fn test_cancellation_between_frames() {
        let cancel = CancellationToken::new();
        let mut decoder =
            decode(Cursor::new(silent_stream(STEREO_44K, 3))).with_cancellation(cancel.clone());
        assert!(decoder.next().unwrap().is_ok());
        cancel.cancel();
        assert!(matches!(decoder.next(), Some(Err(ConversionError::Cancelled))));
        assert!(decoder.next().is_none());
    }

    /// Reader that hands out one byte per call
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(1);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_short_reads() {
        let stream = silent_stream(STEREO_44K, 2);
        let frames: Vec<_> = decode(Trickle(Cursor::new(stream)))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 2);
    }
}
