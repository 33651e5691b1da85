#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `spec.md` §4.4/§7 has two entirely separate notions of "log level":
//!
//! - the wire `quiet` field (0/1/2), which gates what a *session* puts back
//!   on the wire for the remote program to see (acks, progress, errors);
//! - the host process's own diagnostics (parse failures, dropped sessions,
//!   metadata-commit errors that are swallowed rather than surfaced),
//!   which should always be visible to whoever is operating the terminal
//!   emulator, independent of what any one transfer's `quiet` field says.
//!
//! This crate provides [`Quiet`] for the first and a tiny `tracing` facade
//! for the second, so `engine`/`transmission` never call `tracing` macros
//! directly and the distinction stays explicit at every call site.
//!
//! # Design
//!
//! [`Quiet`] wraps the wire's `q` field (`spec.md` §3) and exposes
//! [`Quiet::acks_enabled`]/[`Quiet::errors_enabled`] rather than leaking the
//! raw integer, so callers read `if quiet.errors_enabled() { ... }` instead
//! of re-deriving the `< 2`/`== 0` comparisons `spec.md` §7 specifies at
//! every call site.
//!
//! # Invariants
//!
//! - `Quiet::errors_enabled` is `true` for levels 0 and 1, `false` for 2.
//! - `Quiet::acks_enabled` is `true` only for level 0.
//! - Values above 2 saturate to 2 (silent) rather than panicking or
//!   wrapping, since a malformed `q` field is a remote's problem, not a
//!   reason to crash the engine.
//!
//! # See also
//!
//! - the `transmission` crate's `FileTransmission::handle_receive_cmd`/
//!   `handle_send_cmd`, which consult `Quiet` before sending a `status`.

use std::fmt;

/// How much of a session's activity is echoed back onto the wire.
///
/// Orthogonal to the host process's own `tracing` diagnostics, which always
/// fire (see [`log_protocol_error!`], [`log_io_error!`]) regardless of this
/// value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct Quiet(u8);

impl Quiet {
    /// All acknowledgements and errors are sent (`q=0`, the wire default).
    pub const VERBOSE: Self = Self(0);
    /// Only errors are sent (`q=1`).
    pub const ERRORS_ONLY: Self = Self(1);
    /// Nothing is sent (`q=2`).
    pub const SILENT: Self = Self(2);

    /// Builds a `Quiet` from the wire's raw `q` integer, saturating any
    /// value above 2 to [`Quiet::SILENT`].
    #[must_use]
    pub fn from_wire(level: i64) -> Self {
        match level {
            ..=0 => Self::VERBOSE,
            1 => Self::ERRORS_ONLY,
            _ => Self::SILENT,
        }
    }

    /// The raw `q` integer this value was built from.
    #[must_use]
    pub const fn as_wire(self) -> i64 {
        self.0 as i64
    }

    /// Whether non-error acknowledgements (`OK`, `STARTED`, `PROGRESS`,
    /// `CANCELED`) should be sent for this session.
    #[must_use]
    pub const fn acks_enabled(self) -> bool {
        self.0 == 0
    }

    /// Whether error statuses should be sent for this session
    /// (`spec.md` §7: `send_errors` gated by `quiet < 2`).
    #[must_use]
    pub const fn errors_enabled(self) -> bool {
        self.0 < 2
    }
}

impl fmt::Display for Quiet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Always-on diagnostic for a malformed or out-of-protocol command: logged
/// via `tracing::warn!` regardless of any session's [`Quiet`] level.
#[macro_export]
macro_rules! log_protocol_error {
    ($($arg:tt)*) => {
        $crate::__tracing::warn!($($arg)*);
    };
}

/// Always-on diagnostic for a filesystem I/O failure while servicing a
/// transfer (a failed `chmod`, a failed metadata commit, …).
#[macro_export]
macro_rules! log_io_error {
    ($($arg:tt)*) => {
        $crate::__tracing::error!($($arg)*);
    };
}

/// Always-on diagnostic for a dropped or expired session.
#[macro_export]
macro_rules! log_session_event {
    ($($arg:tt)*) => {
        $crate::__tracing::info!($($arg)*);
    };
}

#[doc(hidden)]
pub use tracing as __tracing;
