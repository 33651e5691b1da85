use thiserror::Error;

/// Errors produced while encoding or decoding a wire command.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// A field carried a value that does not match its declared encoding
    /// (an unrecognised enum name, non-decimal integer, or invalid base64).
    #[error("field {field} has an invalid value: {reason}")]
    InvalidField {
        /// Wire short-name of the offending field.
        field: &'static str,
        /// Human-readable description of what went wrong.
        reason: String,
    },
    /// The command parsed but carried no (or an explicitly invalid) action.
    #[error("no valid action specified in file transmission command")]
    MissingAction,
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
