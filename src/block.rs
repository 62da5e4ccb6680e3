//! Framed block: a versioned, length-prefixed zlib payload on a binary stream.
//!
//! ```text
//! offset  size  field
//!      0     4  raw_size         decompressed payload length
//!      4     4  compressed_size  length of the following payload
//!      8     2  format_version   must be FORMAT_VERSION_0
//!     10     2  reserved         written as 0, ignored on read
//!     12     n  payload          zlib stream, compressed_size bytes
//! ```
//!
//! Integers use the stream's byte order.  There is no checksum; the
//! decompressed length matching `raw_size` is the integrity check.

use thiserror::Error;

use crate::codec::{log_failure, CodecError, ZlibCodec};
use crate::io_stream::{InputStream, OutputStream, StreamBuf};

/// The only format version this build reads or writes.
pub const FORMAT_VERSION_0: u16 = 0;
pub const FRAME_HEADER_SIZE: usize = 12;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Block holds no compressed data")]
    EmptyBlock,
    #[error("Unsupported block format version: {0}")]
    UnsupportedVersion(u16),
    #[error("Source of {len} bytes does not fit a 32-bit size field")]
    SourceTooLarge { len: usize },
    #[error("Declared raw size {raw_size} exceeds the {limit}-byte limit")]
    RawSizeTooLarge { raw_size: u32, limit: usize },
    #[error("Payload truncated: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: u32, actual: usize },
    #[error("Decompressed size mismatch: header says {expected}, got {actual}")]
    SizeMismatch { expected: u32, actual: usize },
    #[error("Stream reported a fault")]
    StreamFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub raw_size:        u32,
    pub compressed_size: u32,
    pub format_version:  u16,
    pub reserved:        u16,
}

impl FrameHeader {
    pub fn new(raw_size: u32, compressed_size: u32) -> Self {
        Self {
            raw_size,
            compressed_size,
            format_version: FORMAT_VERSION_0,
            reserved: 0,
        }
    }

    pub fn write<O: OutputStream + ?Sized>(&self, out: &mut O) {
        out.put32(self.raw_size);
        out.put32(self.compressed_size);
        out.put16(self.format_version);
        out.put16(self.reserved);
    }

    /// Read all four header fields, without validating any of them.
    pub fn read<I: InputStream + ?Sized>(input: &mut I) -> Self {
        Self {
            raw_size:        input.get32(),
            compressed_size: input.get32(),
            format_version:  input.get16(),
            reserved:        input.get16(),
        }
    }
}

/// Compress `data` and write it as one framed block.
pub fn encode_frame<O: OutputStream + ?Sized>(
    codec: &ZlibCodec,
    data:  &[u8],
    out:   &mut O,
) -> Result<(), FrameError> {
    let raw_size = u32::try_from(data.len())
        .map_err(|_| FrameError::SourceTooLarge { len: data.len() })?;
    let payload = codec.compress(data)?;
    if payload.is_empty() {
        return Err(CodecError::Compression("zlib produced no output".into()).into());
    }
    let compressed_size = u32::try_from(payload.len())
        .map_err(|_| FrameError::SourceTooLarge { len: payload.len() })?;

    FrameHeader::new(raw_size, compressed_size).write(out);
    out.put_raw(&payload);

    if out.fail() {
        return Err(FrameError::StreamFault);
    }
    Ok(())
}

/// Read one framed block from `input`, decompress it and append the raw
/// bytes to `out`.
///
/// Validation happens in wire order: a zero `compressed_size` is rejected
/// before the version is read, and the reserved field is skipped without
/// being inspected.
pub fn decode_frame<I, O>(
    codec: &ZlibCodec,
    input: &mut I,
    out:   &mut O,
) -> Result<(), FrameError>
where
    I: InputStream + ?Sized,
    O: OutputStream + ?Sized,
{
    let raw_size = input.get32();
    let compressed_size = input.get32();
    if compressed_size == 0 {
        return Err(FrameError::EmptyBlock);
    }

    let version = input.get16();
    if version != FORMAT_VERSION_0 {
        return Err(FrameError::UnsupportedVersion(version));
    }

    input.skip(2);

    let limit = codec.options.max_output_size;
    if raw_size as usize > limit {
        return Err(FrameError::RawSizeTooLarge { raw_size, limit });
    }

    let payload = input.get_raw(compressed_size as usize);
    if payload.len() != compressed_size as usize {
        return Err(FrameError::TruncatedPayload {
            expected: compressed_size,
            actual:   payload.len(),
        });
    }

    let raw = codec.decompress(&payload, raw_size as usize)?;
    if raw.len() != raw_size as usize {
        return Err(FrameError::SizeMismatch { expected: raw_size, actual: raw.len() });
    }

    out.put_raw(&raw);
    if out.fail() {
        return Err(FrameError::StreamFault);
    }
    Ok(())
}

fn report(context: &str, err: &FrameError) {
    match err {
        FrameError::Codec(e) => log_failure(context, e),
        _ => tracing::debug!("{context}: {err}"),
    }
}

/// Write `data` as a framed block with default codec options.
/// Returns `false` on any failure.
pub fn write_framed_block<O: OutputStream + ?Sized>(data: &[u8], out: &mut O) -> bool {
    encode_frame(&ZlibCodec::default(), data, out)
        .map_err(|e| report("Failed to write framed block", &e))
        .is_ok()
}

/// Write the unread part of `source` as a framed block.  The cursor of
/// `source` is left where it was.
pub fn write_framed_stream_buf<O: OutputStream + ?Sized>(source: &StreamBuf, out: &mut O) -> bool {
    write_framed_block(source.data(), out)
}

/// Read one framed block with default codec options and append its
/// contents to `out`.  Returns `false` on any failure.
///
/// Only zlib failures are logged as errors; format failures (empty block,
/// unknown version, size mismatch) return `false` quietly.
pub fn read_framed_block<I, O>(input: &mut I, out: &mut O) -> bool
where
    I: InputStream + ?Sized,
    O: OutputStream + ?Sized,
{
    decode_frame(&ZlibCodec::default(), input, out)
        .map_err(|e| report("Failed to read framed block", &e))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{compress, CodecOptions};

    fn frame(raw_size: u32, version: u16, payload: &[u8]) -> StreamBuf {
        let mut buf = StreamBuf::new();
        FrameHeader {
            raw_size,
            compressed_size: payload.len() as u32,
            format_version:  version,
            reserved:        0xFFFF,
        }
        .write(&mut buf);
        buf.put_raw(payload);
        buf
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let mut buf = StreamBuf::new();
        assert!(write_framed_block(b"hello hello hello", &mut buf));
        let bytes = buf.as_slice();
        assert_eq!(&bytes[0..4], &17u32.to_le_bytes());
        let compressed = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
        assert_eq!(bytes.len(), FRAME_HEADER_SIZE + compressed as usize);
    }

    #[test]
    fn roundtrip() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 13) as u8).collect();
        let mut wire = StreamBuf::new();
        assert!(write_framed_block(&data, &mut wire));

        let mut out = StreamBuf::new();
        assert!(read_framed_block(&mut wire, &mut out));
        assert_eq!(out.as_slice(), &data[..]);
        assert_eq!(wire.size(), 0);
    }

    #[test]
    fn consecutive_blocks_on_one_stream() {
        let mut wire = StreamBuf::new();
        assert!(write_framed_block(b"first", &mut wire));
        assert!(write_framed_block(b"second block", &mut wire));

        let mut out = StreamBuf::new();
        assert!(read_framed_block(&mut wire, &mut out));
        assert!(read_framed_block(&mut wire, &mut out));
        assert_eq!(out.as_slice(), b"firstsecond block");
    }

    #[test]
    fn empty_source_writes_nothing() {
        let mut wire = StreamBuf::new();
        assert!(!write_framed_block(&[], &mut wire));
        assert!(wire.as_slice().is_empty());
    }

    #[test]
    fn stream_buf_source_uses_unread_bytes() {
        let mut source = StreamBuf::from_vec(b"skipme-payload".to_vec());
        source.skip(7);
        let mut wire = StreamBuf::new();
        assert!(write_framed_stream_buf(&source, &mut wire));

        let mut out = StreamBuf::new();
        assert!(read_framed_block(&mut wire, &mut out));
        assert_eq!(out.as_slice(), b"payload");
    }

    #[test]
    fn zero_compressed_size_is_rejected() {
        let mut wire = frame(10, FORMAT_VERSION_0, &[]);
        let mut out = StreamBuf::new();
        assert!(matches!(
            decode_frame(&ZlibCodec::default(), &mut wire, &mut out),
            Err(FrameError::EmptyBlock)
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let payload = compress(b"abc");
        let mut wire = frame(3, 1, &payload);
        let mut out = StreamBuf::new();
        assert!(matches!(
            decode_frame(&ZlibCodec::default(), &mut wire, &mut out),
            Err(FrameError::UnsupportedVersion(1))
        ));
        assert!(out.as_slice().is_empty());
    }

    #[test]
    fn reserved_field_is_ignored() {
        let payload = compress(b"abc");
        let mut wire = frame(3, FORMAT_VERSION_0, &payload);
        let mut out = StreamBuf::new();
        assert!(read_framed_block(&mut wire, &mut out));
        assert_eq!(out.as_slice(), b"abc");
    }

    #[test]
    fn raw_size_mismatch_is_rejected() {
        let payload = compress(b"abcdef");
        for wrong in [5u32, 7, 600] {
            let mut wire = frame(wrong, FORMAT_VERSION_0, &payload);
            let mut out = StreamBuf::new();
            let err = decode_frame(&ZlibCodec::default(), &mut wire, &mut out).unwrap_err();
            assert!(
                matches!(err, FrameError::SizeMismatch { expected, actual: 6 } if expected == wrong),
                "{err}"
            );
            assert!(out.as_slice().is_empty());
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let payload = compress(b"some longer payload text");
        let mut wire = frame(24, FORMAT_VERSION_0, &payload);
        let full = wire.clone().into_vec();
        wire = StreamBuf::from_vec(full[..full.len() - 3].to_vec());
        let mut out = StreamBuf::new();
        assert!(matches!(
            decode_frame(&ZlibCodec::default(), &mut wire, &mut out),
            Err(FrameError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn raw_size_above_limit_is_rejected_before_reading_payload() {
        let payload = compress(&[0u8; 4096]);
        let mut wire = frame(4096, FORMAT_VERSION_0, &payload);
        let codec = ZlibCodec::new(CodecOptions { max_output_size: 1024, ..Default::default() });
        let mut out = StreamBuf::new();
        assert!(matches!(
            decode_frame(&codec, &mut wire, &mut out),
            Err(FrameError::RawSizeTooLarge { raw_size: 4096, limit: 1024 })
        ));
        assert_eq!(wire.size(), payload.len());
    }

    #[test]
    fn corrupt_payload_surfaces_codec_error() {
        let mut wire = frame(8, FORMAT_VERSION_0, &[0xFF; 8]);
        let mut out = StreamBuf::new();
        assert!(matches!(
            decode_frame(&ZlibCodec::default(), &mut wire, &mut out),
            Err(FrameError::Codec(_))
        ));
    }

    #[test]
    fn big_endian_streams_roundtrip() {
        use crate::io_stream::Endian;
        let mut wire = StreamBuf::with_endian(Endian::Big);
        assert!(write_framed_block(b"big endian", &mut wire));
        assert_eq!(&wire.as_slice()[0..4], &10u32.to_be_bytes());
        let mut out = StreamBuf::new();
        assert!(read_framed_block(&mut wire, &mut out));
        assert_eq!(out.as_slice(), b"big endian");
    }
}
