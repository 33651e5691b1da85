use thiserror::Error;

/// Errors produced while building, loading, or applying a signature/delta.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O failure against the signature, source, or destination file.
    #[error("signature I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A signature byte stream ended in the middle of a block record.
    #[error("signature stream truncated: expected {expected} more bytes, got {got}")]
    TruncatedSignature {
        /// Bytes still required to complete the current record.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },
    /// A delta byte stream carried an opcode this version does not recognise.
    #[error("delta stream carried unknown opcode {0:#04x}")]
    UnknownDeltaOp(u8),
    /// A delta `copy` op referenced a block index past the end of the signature.
    #[error("delta copy op referenced block {index}, signature has {len} blocks")]
    BlockIndexOutOfRange {
        /// Block index the delta op referenced.
        index: u32,
        /// Number of blocks actually present in the signature.
        len: usize,
    },
    /// [`crate::LoadSignature::commit`] was called before any bytes were added.
    #[error("signature loader committed with no data")]
    EmptySignature,
}
