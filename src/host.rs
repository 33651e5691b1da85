//! The three collaborator traits a host process implements to drive a
//! [`crate::FileTransmission`] (`spec.md` §4.7, §9): writing frames to the
//! remote, prompting the user for confirmation, and scheduling the timer
//! callbacks that carry the engine past every backpressure and async-pump
//! suspension point.
//!
//! This engine holds no event loop of its own — single-threaded and
//! cooperative, it only ever acts in response to a call from the host, and
//! its only way of acting back is through these three traits.

use std::time::Duration;

/// Which side of a transfer a confirmation prompt (or a pending-session
/// rejection) concerns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    /// The remote wants to send files to this host.
    Receive,
    /// The remote wants to read files from this host.
    Send,
}

/// Identifies which of the engine's suspended pumps a fired timer belongs
/// to, so the host can hand it back to [`crate::FileTransmission::on_timer`]
/// without needing to understand the engine's internals.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TimerToken {
    /// Retries the single shared FIFO of backpressured response commands
    /// (`spec.md` §5, ~200ms cadence).
    RetryPendingResponses,
    /// Retries every send session's chunk pump (`spec.md` §4.5
    /// `pump_send_chunks`, ~50ms cadence).
    PumpSends,
    /// Advances one receive session's outbound rsync-signature pump
    /// (`spec.md` §4.4, ~0ms normal / ~100ms backpressure cadence).
    PumpSignature {
        /// The receive session this signature is being sent to.
        session_id: String,
        /// The file whose signature is being transmitted.
        file_id: String,
    },
}

/// An opaque handle to a scheduled timer callback. The engine never inspects
/// or cancels a handle; it exists purely for the host's own bookkeeping.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TimerHandle(pub u64);

/// Writes a fully wire-encoded frame (already OSC-prefixed) to the remote
/// program.
pub trait Writer {
    /// Attempts to write `frame` to the remote.
    ///
    /// Returns `false` if the write could not be accepted right now
    /// (backpressure): the engine will requeue the frame and retry later via
    /// a [`Timer`] callback, per `spec.md` §5.
    fn write_serialized(&mut self, frame: &[u8]) -> bool;
}

/// Surfaces a transfer's confirmation prompt to whoever is operating the
/// terminal.
pub trait Confirmation {
    /// Asks the user a yes/no question about a pending transfer.
    ///
    /// The host is expected to eventually report the answer back through
    /// [`crate::FileTransmission::on_confirmation`] with the same `id` and
    /// `side`; this call itself does not block or return the answer
    /// synchronously (`spec.md` §5 "Confirmation prompt").
    fn prompt_yesno(&mut self, message: &str, id: &str, side: Side);
}

/// Schedules a deferred callback.
pub trait Timer {
    /// Arranges for [`crate::FileTransmission::on_timer`] to be called with
    /// `token` after `after` has elapsed.
    fn schedule(&mut self, after: Duration, token: TimerToken) -> TimerHandle;
}

/// Anything that can play all three collaborator roles at once. Blanket
/// implemented for any type implementing [`Writer`], [`Confirmation`], and
/// [`Timer`] — every [`crate::FileTransmission`] entry point takes a `&mut
/// impl Host` rather than three separate parameters.
pub trait Host: Writer + Confirmation + Timer {}

impl<T: Writer + Confirmation + Timer> Host for T {}
