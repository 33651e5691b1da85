#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Wire command codec for the file transmission engine's OSC-tunnelled
//! protocol: a tagged key-value record (`ac=...;id=...;...`) exchanged
//! between the engine and a remote program inside the terminal session.
//!
//! # Design
//!
//! - [`action`] — the four enum fields (`Action`, `Compression`, `FileType`,
//!   `TransmissionType`).
//! - [`wire`] — control-code sanitisation, `;;` semicolon escaping, and the
//!   `key=value;key=value` tokenizer.
//! - [`command`] — [`FileTransferCommand`] itself: field table, defaults,
//!   `serialize`/`deserialize`.
//!
//! # Invariants
//!
//! - `deserialize(serialize(c)) == c` for any command built from valid
//!   field values, including values containing literal `;`.
//! - Serializing a command equal to [`FileTransferCommand::default`] in
//!   every field but `action` emits only the `ac=` key.
//! - Unknown wire keys are silently ignored (forward compatibility); a
//!   field whose value cannot be decoded under its declared encoding fails
//!   the whole parse.
//!
//! # Errors
//!
//! See [`Error`].
//!
//! # See also
//!
//! - the `engine` crate, which is the sole consumer of this codec.

mod action;
mod command;
mod error;
mod wire;

pub use action::{Action, Compression, FileType, TransmissionType};
pub use command::{FileTransferCommand, OSC_PREFIX};
pub use error::Error;
pub use wire::{escape_semicolons, sanitize_control_codes};
