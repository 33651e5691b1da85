#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The root of the workspace: a kitty-style file transmission protocol
//! engine that tunnels an rsync-flavored send/receive handshake through a
//! terminal emulator's OSC escape sequences (`spec.md` §1-§3).
//!
//! This crate owns session admission, the confirmation handshake, and the
//! backpressure/retry plumbing ([`FileTransmission`]); the per-file state
//! machines and metadata walker live in `engine`, the wire grammar in
//! `protocol`, and the rsync signature/delta/patch pipeline in
//! `signature`. None of those crates know about session ids, the two
//! ten-entry admission caps, or a running event loop — this one does.
//!
//! # Design
//!
//! [`FileTransmission`] never blocks and never spawns anything: it is
//! driven entirely by calls from a host process, and acts back on the host
//! only through the three collaborator traits in [`host`] — [`Writer`],
//! [`Confirmation`], and [`Timer`], unified as [`Host`]. A host embedding
//! this crate typically looks like:
//!
//! ```ignore
//! let mut engine = FileTransmission::new(Config::default());
//! // on each OSC 5113 payload received from the remote:
//! engine.handle_serialized_command(payload, &mut my_host);
//! // when a scheduled timer fires:
//! engine.on_timer(token, &mut my_host);
//! // when the user answers a confirmation prompt:
//! engine.on_confirmation(&id, side, approved, &mut my_host);
//! ```
//!
//! # Errors
//!
//! Command dispatch never returns an error: a malformed or out-of-protocol
//! command is logged (via the `logging` crate, always-on regardless of any
//! session's `quiet` level) and dropped, per `spec.md` §4.7. [`Error`]
//! exists for the handful of synchronous operations that can still fail.

mod bypass;
mod config;
mod engine;
mod error;
mod host;
mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bypass::{check_bypass, encode_bypass};
pub use config::Config;
pub use engine::FileTransmission;
pub use error::Error;
pub use host::{Confirmation, Host, Side, Timer, TimerHandle, TimerToken, Writer};
