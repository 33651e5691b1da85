#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Applies the permission/timestamp half of a destination file's metadata
//! (`spec.md` §4.2 `apply_metadata`, §4.4 `commit`): `chmod` and `utime`,
//! with a link-preserving variant for symlinks.
//!
//! # Design
//!
//! Three entry points, one per filesystem entry kind the wire protocol
//! knows about ([`FileType`](protocol::FileType) `regular`/`directory`/
//! `symlink`): [`apply_file`], [`apply_dir`], [`apply_symlink`]. All three
//! take the command record's raw `mtime`/`permissions` fields directly
//! (`-1` is the wire default meaning "not provided") rather than an
//! `Option` layer, so the `engine` crate can pass a
//! [`protocol::FileTransferCommand`]'s fields straight through.
//!
//! # Invariants
//!
//! - A field equal to the wire default (`-1`) is left untouched.
//! - [`apply_symlink`] never follows the link: it changes the symlink's own
//!   mode/timestamps, not its target's.
//! - [`apply_symlink`] swallows `ENOTSUP`/`ENOSYS` (there is no `lchmod` on
//!   Linux, for instance) rather than failing the whole commit, mirroring
//!   `spec.md` §4.2's "ignoring `NotImplementedError`".
//!
//! # Errors
//!
//! See [`Error`].
//!
//! # See also
//!
//! - the `engine` crate's `DestFile::apply_metadata` and
//!   `ActiveReceive::commit`, the sole callers of this crate.

mod apply;
mod error;

pub use apply::{apply_dir, apply_file, apply_symlink};
pub use error::Error;
