#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The per-file state machines and metadata walker behind one side of the
//! file transmission protocol (`spec.md` §4): this crate has no notion of
//! the wire itself (that's `protocol`) or of a running session's admission
//! control and dispatch (that's the root `transmission` crate) — it only
//! knows how to turn already-parsed command fields into filesystem effects
//! and back.
//!
//! # Design
//!
//! - [`DestFile`] and [`ActiveReceive`] together implement the receiving
//!   side (`spec.md` §4.2/§4.4, components C2/C4): one open destination
//!   file, and the map of all such files live in one inbound session.
//! - [`SourceFile`] and [`ActiveSend`] implement the sending side
//!   (`spec.md` §4.3/§4.5, components C3/C5): one file being read and
//!   streamed out, and the session that owns the spec-collection and
//!   chunk-pump state around a set of them.
//! - [`walk_file_specs`] implements the metadata walker (`spec.md` §4.6,
//!   component C6): expanding a send session's file specs into the flat
//!   `file` command listing the remote receives before any file body.
//! - [`TransmissionError`] is the failure type every fallible operation in
//!   this crate returns; it carries exactly what's needed to render a wire
//!   `status` command (`spec.md` §6.7, §7).
//!
//! # Errors
//!
//! Every public fallible operation returns [`TransmissionError`], not a
//! bare `io::Error` — callers that need to put a failure on the wire call
//! [`TransmissionError::as_command`] rather than re-deriving the mapping
//! from `spec.md` §7 themselves.
//!
//! # See also
//!
//! - the `transmission` crate's `FileTransmission`, which owns a map of
//!   [`ActiveReceive`]/[`ActiveSend`] sessions keyed by session id and
//!   drives them from parsed `protocol::FileTransferCommand`s.

mod active_receive;
mod active_send;
mod dest_file;
mod error;
mod source_file;
mod walk;

pub use active_receive::{ActiveReceive, DataOutcome, StartedFile, EXPIRE_AFTER};
pub use active_send::{ActiveSend, MAX_SEND_FILES, MAX_SPEC_ENTRIES, WIRE_CHUNK_SIZE};
pub use dest_file::{DestFile, NewFileInfo};
pub use error::{ErrorCode, TransmissionError};
pub use source_file::SourceFile;
pub use walk::{walk_file_specs, WalkItem};
