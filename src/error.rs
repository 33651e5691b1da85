//! [`Error`]: the union of failure modes that can arise while driving a
//! [`crate::FileTransmission`] from outside its normal command dispatch —
//! notably, malformed-command parsing, which the engine logs and drops
//! rather than propagating (`spec.md` §4.7 `handle_serialized_command`).

/// Failure modes a host embedding this crate may want to match on.
///
/// Command dispatch itself ([`crate::FileTransmission::handle_serialized_command`])
/// never returns this: per `spec.md` §4.7, a malformed command is logged and
/// silently dropped, not surfaced to the caller. This type exists for the
/// few operations that *can* fail synchronously, such as constructing a
/// [`crate::Config`] from untrusted input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command failed to parse off the wire.
    #[error("failed to parse file transfer command: {0}")]
    Protocol(#[from] protocol::Error),
    /// A per-session operation failed.
    #[error(transparent)]
    Transmission(#[from] engine::TransmissionError),
}
