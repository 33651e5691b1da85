#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! rsync-style signature, delta, and patch primitives. `spec.md` treats
//! these as an opaque three-call library (`signature_of_file`,
//! `LoadSignature`, `delta_for_file`) layered over a `PatchFile` write sink;
//! this crate provides concrete implementations built on the workspace's own
//! [`checksums`] crate rather than pulling in an external delta-compression
//! dependency.
//!
//! # Design
//!
//! - [`block`] — [`Signature`]/[`SignatureBlock`], and the adaptive
//!   block-size heuristic.
//! - [`wire`] (private) — the byte layout shared by the signature and delta
//!   streams; opaque outside this crate, travels only inside a command's
//!   `data` field.
//! - [`sig_chunks`] — [`signature_of_file`], a lazy per-block chunk
//!   producer.
//! - [`load`] — [`LoadSignature`], the chunk-accumulating receiver.
//! - [`delta`] — [`delta_for_file`], a lazy rolling-checksum scan emitting
//!   copy/literal delta ops.
//! - [`patch`] — [`PatchFile`], the delta-consuming, tempfile-swap patch
//!   writer.
//!
//! # Invariants
//!
//! - Every producer (`SignatureChunks`, `DeltaChunks`) does a bounded amount
//!   of work per [`Iterator::next`] call; none of them block on hashing or
//!   scanning a whole file in a single step.
//! - [`PatchFile::commit`] never touches the destination path until the
//!   rename; a crash or dropped `PatchFile` before that point leaves the
//!   original file untouched.
//!
//! # Errors
//!
//! See [`Error`].
//!
//! # See also
//!
//! - the `engine` crate, the sole consumer of this crate's producers and
//!   [`PatchFile`].

mod block;
mod delta;
mod error;
mod load;
mod patch;
mod sig_chunks;
mod wire;

pub use block::{block_size_for_len, Signature, SignatureBlock, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use delta::{delta_for_file, DeltaChunks};
pub use error::Error;
pub use load::LoadSignature;
pub use patch::PatchFile;
pub use sig_chunks::{signature_of_file, SignatureChunks};
