//! Push-based (as opposed to [`std::io::Write`]/[`std::io::Read`]-based)
//! compressor/decompressor pair.
//!
//! `engine::SourceFile`/`DestFile` hand compression arbitrarily-sized chunks
//! as they arrive off the wire or out of a source file and need whatever
//! compressed/decompressed bytes are available back immediately — there is
//! no reader or writer to hand the `flate2::read`/`flate2::write` wrappers
//! in [`crate::zlib`], which pull from or push into a stream themselves.
//! This module drives `flate2`'s low-level [`Compress`]/[`Decompress`]
//! bindings directly, one call per chunk, mirroring the sender/receiver
//! kitten's `ZlibCompressor`/`ZlibDecompressor` stateful objects.

use std::io;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::zlib::CompressionLevel;

fn io_err<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::other(e.to_string())
}

/// Per-file payload compressor. `Identity` is a passthrough (the `none`
/// wire value); `Zlib` drives a stateful raw-deflate stream across calls.
pub enum Compressor {
    /// No compression: `compress` returns its input unchanged.
    Identity,
    /// Raw-deflate streaming compression.
    Zlib(Box<Compress>),
}

impl Compressor {
    /// A no-op compressor for the wire's `none` compression value.
    #[must_use]
    pub const fn identity() -> Self {
        Self::Identity
    }

    /// A streaming raw-deflate compressor for the wire's `zlib` value.
    #[must_use]
    pub fn zlib(level: CompressionLevel) -> Self {
        let level: Compression = level.into();
        Self::Zlib(Box::new(Compress::new(level, false)))
    }

    /// Compresses (or passes through) one chunk of plaintext.
    ///
    /// # Errors
    ///
    /// Propagates any error the underlying deflate stream reports.
    pub fn compress(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Zlib(inner) => {
                let mut out = Vec::new();
                drive_compress(inner, data, FlushCompress::None, &mut out)?;
                Ok(out)
            }
        }
    }

    /// Finalises the stream, returning any trailing bytes the deflate
    /// window was still holding back. A no-op for [`Compressor::Identity`].
    ///
    /// # Errors
    ///
    /// Propagates any error the underlying deflate stream reports.
    pub fn flush(&mut self) -> io::Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(Vec::new()),
            Self::Zlib(inner) => {
                let mut out = Vec::new();
                drive_compress(inner, &[], FlushCompress::Finish, &mut out)?;
                Ok(out)
            }
        }
    }
}

/// Per-file payload decompressor, the receiving-side counterpart of
/// [`Compressor`].
pub enum Decompressor {
    /// No compression: `decompress` returns its input unchanged.
    Identity,
    /// Raw-deflate streaming decompression.
    Zlib(Box<Decompress>),
}

impl Decompressor {
    /// A no-op decompressor for the wire's `none` compression value.
    #[must_use]
    pub const fn identity() -> Self {
        Self::Identity
    }

    /// A streaming raw-deflate decompressor for the wire's `zlib` value.
    #[must_use]
    pub fn zlib() -> Self {
        Self::Zlib(Box::new(Decompress::new(false)))
    }

    /// Decompresses one chunk, flushing the trailing window on `is_last`.
    ///
    /// # Errors
    ///
    /// Propagates any error the underlying inflate stream reports (such as
    /// a truncated or corrupt stream).
    pub fn decompress(&mut self, data: &[u8], is_last: bool) -> io::Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Zlib(inner) => {
                let mut out = Vec::new();
                let flush = if is_last {
                    FlushDecompress::Finish
                } else {
                    FlushDecompress::None
                };
                drive_decompress(inner, data, flush, &mut out)?;
                Ok(out)
            }
        }
    }
}

/// `compress_vec`/`decompress_vec` only ever write into a `Vec`'s *existing
/// spare capacity* and never grow it themselves — handing them a
/// zero-capacity `Vec` yields `Status::BufError` with nothing produced or
/// consumed on the very first call. Reserve more room whenever the buffer
/// is full so the drive loops below always make progress.
fn ensure_spare_capacity(out: &mut Vec<u8>, hint: usize) {
    if out.spare_capacity_mut().is_empty() {
        out.reserve(hint.max(64));
    }
}

fn drive_compress(
    inner: &mut Compress,
    input: &[u8],
    flush: FlushCompress,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let is_finish = matches!(flush, FlushCompress::Finish);
    let mut offset = 0usize;
    ensure_spare_capacity(out, input.len());
    loop {
        let before_in = inner.total_in();
        let before_out = out.len();
        let status = inner
            .compress_vec(&input[offset..], out, flush)
            .map_err(io_err)?;
        let consumed = (inner.total_in() - before_in) as usize;
        offset += consumed;
        let produced = out.len() - before_out;

        match status {
            Status::StreamEnd => return Ok(()),
            Status::BufError if produced == 0 && consumed == 0 => {
                if out.spare_capacity_mut().is_empty() {
                    ensure_spare_capacity(out, out.capacity().max(64));
                    continue;
                }
                return Ok(());
            }
            _ => {
                if !is_finish && offset >= input.len() {
                    return Ok(());
                }
                ensure_spare_capacity(out, out.capacity().max(64));
            }
        }
    }
}

fn drive_decompress(
    inner: &mut Decompress,
    input: &[u8],
    flush: FlushDecompress,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let is_finish = matches!(flush, FlushDecompress::Finish);
    let mut offset = 0usize;
    ensure_spare_capacity(out, input.len().max(64) * 4);
    loop {
        let before_in = inner.total_in();
        let before_out = out.len();
        let status = inner
            .decompress_vec(&input[offset..], out, flush)
            .map_err(io_err)?;
        let consumed = (inner.total_in() - before_in) as usize;
        offset += consumed;
        let produced = out.len() - before_out;

        match status {
            Status::StreamEnd => return Ok(()),
            Status::BufError if produced == 0 && consumed == 0 => {
                if out.spare_capacity_mut().is_empty() {
                    ensure_spare_capacity(out, out.capacity().max(64));
                    continue;
                }
                return Ok(());
            }
            _ => {
                if !is_finish && offset >= input.len() {
                    return Ok(());
                }
                ensure_spare_capacity(out, out.capacity().max(64));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trip() {
        let mut c = Compressor::identity();
        let mut d = Decompressor::identity();
        let chunk = c.compress(b"hello").unwrap();
        let out = d.decompress(&chunk, true).unwrap();
        assert_eq!(out, b"hello");
        assert!(c.flush().unwrap().is_empty());
    }

    #[test]
    fn zlib_round_trip_single_chunk() {
        let mut c = Compressor::zlib(CompressionLevel::Default);
        let mut d = Decompressor::zlib();
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(16);

        let mut compressed = c.compress(&payload).unwrap();
        compressed.extend(c.flush().unwrap());

        let mut decoded = d.decompress(&compressed, true).unwrap();
        assert_eq!(decoded.len(), payload.len());
        decoded.truncate(payload.len());
        assert_eq!(decoded, payload);
    }

    #[test]
    fn zlib_round_trip_multiple_chunks() {
        let mut c = Compressor::zlib(CompressionLevel::Default);
        let mut d = Decompressor::zlib();
        let payload = b"streamed in small pieces to exercise incremental state".repeat(64);

        let mut compressed = Vec::new();
        for chunk in payload.chunks(37) {
            compressed.extend(c.compress(chunk).unwrap());
        }
        compressed.extend(c.flush().unwrap());

        let mut decoded = Vec::new();
        let mut offset = 0;
        let wire_chunks: Vec<&[u8]> = compressed.chunks(29).collect();
        for (i, wchunk) in wire_chunks.iter().enumerate() {
            let is_last = i + 1 == wire_chunks.len();
            decoded.extend(d.decompress(wchunk, is_last).unwrap());
            offset += wchunk.len();
        }
        let _ = offset;
        assert_eq!(decoded, payload);
    }

    #[test]
    fn zlib_round_trip_empty_payload() {
        let mut c = Compressor::zlib(CompressionLevel::Default);
        let mut d = Decompressor::zlib();
        let mut compressed = c.compress(b"").unwrap();
        compressed.extend(c.flush().unwrap());
        let decoded = d.decompress(&compressed, true).unwrap();
        assert!(decoded.is_empty());
    }
}
