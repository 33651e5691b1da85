#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Compression primitives for the file transmission engine.
//!
//! The wire protocol's `compression` field is a two-value enum, `none` or
//! `zlib` (raw deflate, no zlib header/trailer, matching the terminal's own
//! `zlib.decompressobj(wbits=0)` convention). This crate provides the
//! streaming encoder/decoder pair used by `engine::SourceFile`/`DestFile` to
//! implement that field; there is no LZ4 or Zstandard path because nothing in
//! this workspace negotiates those algorithms.
//!
//! # Examples
//!
//! ```
//! use compress::chunked::{Compressor, Decompressor};
//! use compress::zlib::CompressionLevel;
//!
//! # fn main() -> std::io::Result<()> {
//! let mut compressor = Compressor::zlib(CompressionLevel::Default);
//! let mut decompressor = Decompressor::zlib();
//!
//! let mut compressed = compressor.compress(b"streaming example payload")?;
//! compressed.extend(compressor.flush()?);
//!
//! let decompressed = decompressor.decompress(&compressed, true)?;
//! assert_eq!(decompressed, b"streaming example payload");
//! # Ok(())
//! # }
//! ```

pub mod chunked;
pub mod zlib;

pub use chunked::{Compressor, Decompressor};
