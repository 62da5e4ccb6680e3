//! Zlib compression primitives over plain byte buffers.
//!
//! # Buffers
//! Compressed output carries no self-describing length; whoever stores it is
//! responsible for remembering how many bytes it occupies.  Decompressed
//! output may or may not have a known size up front:
//!   - Known size (round-trip use): the output buffer is allocated once at
//!     exactly that size.
//!   - Unknown size (foreign/legacy data): the output buffer starts at
//!     `source × 7` and doubles every time zlib runs out of room.
//!
//! A wrong size hint is not fatal.  It is treated as the first guess and
//! grows through the same doubling policy.  The returned length therefore
//! never has to equal the hint; callers that need that check do it
//! themselves (see `block::decode_frame`).
//!
//! # Error surface
//! [`ZlibCodec`] returns `Result<_, CodecError>` and never logs.  The free
//! functions [`compress`] and [`decompress`] are total: they log the failure
//! through `tracing` and hand back an empty buffer.

use std::os::raw::c_ulong;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multiplier applied to the source length for the first output guess when
/// the decompressed size is unknown.
pub const INITIAL_SIZE_MULTIPLIER: usize = 7;
/// Growth factor applied to the output buffer after a "buffer too small".
pub const GROWTH_FACTOR: usize = 2;
/// zlib's `Z_DEFAULT_COMPRESSION` level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
/// Largest allocation a `Vec<u8>` can make.
pub const MAX_BUFFER_SIZE: usize = isize::MAX as usize;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Source buffer is empty")]
    EmptyInput,
    /// The length does not fit zlib's native length type (`uLong`).
    #[error("Buffer length {len} is not representable as a zlib length")]
    LengthNotRepresentable { len: usize },
    #[error("Output buffer cannot grow beyond {size} bytes")]
    CapacityExhausted { size: usize },
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Compressed stream ended before the end-of-stream marker")]
    TruncatedStream,
}

impl CodecError {
    /// True for failures detected before zlib is ever called.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, CodecError::EmptyInput | CodecError::LengthNotRepresentable { .. })
    }
}

/// Log a codec failure the way the total APIs do.
///
/// Empty input is a no-op for callers and is only traced at debug level.
pub(crate) fn log_failure(context: &str, err: &CodecError) {
    match err {
        CodecError::EmptyInput => tracing::debug!("{context}: {err}"),
        _ => tracing::error!("{context}: {err}"),
    }
}

// ── Options ──────────────────────────────────────────────────────────────────

/// Tunables for [`ZlibCodec`].  Loadable from JSON; missing fields take their
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// zlib level, 0 (store) to 9 (best).  Values above 9 are clamped.
    pub level: u32,
    /// Upper bound on any decompressed buffer, in bytes.
    pub max_output_size: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            level:           DEFAULT_COMPRESSION_LEVEL,
            max_output_size: MAX_BUFFER_SIZE,
        }
    }
}

impl CodecOptions {
    pub fn compression(&self) -> Compression {
        Compression::new(self.level.min(9))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// zlib's `compressBound`: the worst-case compressed size for `len` input
/// bytes.  `None` when the bound overflows `usize`.
pub fn compress_bound(len: usize) -> Option<usize> {
    len.checked_add(len >> 12)?
        .checked_add(len >> 14)?
        .checked_add(len >> 25)?
        .checked_add(13)
}

fn native_len(len: usize) -> Result<c_ulong, CodecError> {
    c_ulong::try_from(len).map_err(|_| CodecError::LengthNotRepresentable { len })
}

enum Inflate {
    Done(usize),
    OutputFull,
}

/// One full decompression attempt into `dst`, restarting from the first byte
/// of `src`.
fn inflate_into(src: &[u8], dst: &mut [u8]) -> Result<Inflate, CodecError> {
    let mut inflater = Decompress::new(true);
    loop {
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out() as usize;
        let status = inflater
            .decompress(&src[consumed..], &mut dst[produced..], FlushDecompress::Finish)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;

        let written = inflater.total_out() as usize;
        if status == Status::StreamEnd {
            return Ok(Inflate::Done(written));
        }
        if written == dst.len() {
            return Ok(Inflate::OutputFull);
        }
        // Room left, no progress: the stream stops short of its end.
        if inflater.total_in() as usize == consumed && written == produced {
            return Err(CodecError::TruncatedStream);
        }
    }
}

// ── Codec ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec {
    pub options: CodecOptions,
}

impl ZlibCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    /// Compress `src` into a zlib stream.
    ///
    /// The output buffer is sized by [`compress_bound`], so a single pass
    /// always suffices; running out of room is reported as a compression
    /// error rather than retried.
    pub fn compress(&self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        if src.is_empty() {
            return Err(CodecError::EmptyInput);
        }
        native_len(src.len())?;

        let bound = compress_bound(src.len())
            .ok_or(CodecError::LengthNotRepresentable { len: src.len() })?;
        native_len(bound)?;

        let mut out = vec![0u8; bound];
        let mut deflater = Compress::new(self.options.compression(), true);
        loop {
            let consumed = deflater.total_in() as usize;
            let produced = deflater.total_out() as usize;
            let status = deflater
                .compress(&src[consumed..], &mut out[produced..], FlushCompress::Finish)
                .map_err(|e| CodecError::Compression(e.to_string()))?;

            let written = deflater.total_out() as usize;
            if status == Status::StreamEnd {
                out.truncate(written);
                return Ok(out);
            }
            if written == out.len()
                || (deflater.total_in() as usize == consumed && written == produced)
            {
                return Err(CodecError::Compression(format!(
                    "zlib stream did not finish within the {bound}-byte bound"
                )));
            }
        }
    }

    /// Decompress a zlib stream.
    ///
    /// `known_size` is the expected decompressed length, or 0 when unknown.
    pub fn decompress(&self, src: &[u8], known_size: usize) -> Result<Vec<u8>, CodecError> {
        if src.is_empty() {
            return Err(CodecError::EmptyInput);
        }
        native_len(src.len())?;

        let limit = self.options.max_output_size.min(MAX_BUFFER_SIZE);
        let mut size = if known_size != 0 {
            known_size
        } else {
            // Too large to multiply: start at the source size and let it grow.
            src.len()
                .checked_mul(INITIAL_SIZE_MULTIPLIER)
                .filter(|guess| *guess <= limit)
                .unwrap_or(src.len())
        };
        if size > limit {
            return Err(CodecError::CapacityExhausted { size: limit });
        }

        let mut out = vec![0u8; size];
        loop {
            native_len(out.len())?;
            match inflate_into(src, &mut out)? {
                Inflate::Done(len) => {
                    out.truncate(len);
                    return Ok(out);
                }
                Inflate::OutputFull => {
                    size = size
                        .checked_mul(GROWTH_FACTOR)
                        .filter(|grown| *grown <= limit)
                        .ok_or(CodecError::CapacityExhausted { size: limit })?;
                    tracing::debug!("zlib output buffer too small, growing to {size} bytes");
                    out.resize(size, 0);
                }
            }
        }
    }
}

// ── Total API ────────────────────────────────────────────────────────────────

/// Decompress with default options.  Returns an empty buffer on any failure.
pub fn decompress(src: &[u8], known_size: usize) -> Vec<u8> {
    ZlibCodec::default()
        .decompress(src, known_size)
        .unwrap_or_else(|e| {
            log_failure("zlib decompression failed", &e);
            Vec::new()
        })
}

/// Compress with default options.  Returns an empty buffer on any failure.
pub fn compress(src: &[u8]) -> Vec<u8> {
    ZlibCodec::default().compress(src).unwrap_or_else(|e| {
        log_failure("zlib compression failed", &e);
        Vec::new()
    })
}
