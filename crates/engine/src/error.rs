//! [`TransmissionError`]: the per-operation failure type threaded through
//! [`crate::DestFile`]/[`crate::SourceFile`]/[`crate::ActiveReceive`]/
//! [`crate::ActiveSend`] (`spec.md` §7).

use std::fmt;
use std::io;

use protocol::{Action, FileTransferCommand};

/// Wire-visible error/status code (`spec.md` §6.7).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Operation succeeded.
    Ok,
    /// A destination file was created and is ready to receive data.
    Started,
    /// The session was cancelled mid-transfer.
    Canceled,
    /// Partial progress on a multi-chunk write.
    Progress,
    /// Malformed command or other protocol violation.
    Einval,
    /// User confirmation (or the bypass check) refused the transfer.
    Eperm,
    /// Attempted to write data to a directory entry.
    Eisdir,
    /// Referenced path does not exist.
    Enoent,
    /// Any other POSIX errno, rendered as its conventional name (`ENOSPC`,
    /// `EROFS`, …).
    Errno(String),
}

impl ErrorCode {
    /// The wire string for this code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::Started => "STARTED",
            Self::Canceled => "CANCELED",
            Self::Progress => "PROGRESS",
            Self::Einval => "EINVAL",
            Self::Eperm => "EPERM",
            Self::Eisdir => "EISDIR",
            Self::Enoent => "ENOENT",
            Self::Errno(s) => s,
        }
    }

    /// Maps a filesystem I/O failure to the closest POSIX errno code.
    #[must_use]
    pub fn from_io_error(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::Enoent,
            io::ErrorKind::PermissionDenied => Self::Eperm,
            _ => Self::Errno(errno_name(e)),
        }
    }
}

#[cfg(unix)]
fn errno_name(e: &io::Error) -> String {
    let name = match e.raw_os_error() {
        Some(libc::ENOSPC) => "ENOSPC",
        Some(libc::EROFS) => "EROFS",
        Some(libc::EXDEV) => "EXDEV",
        Some(libc::EMFILE) => "EMFILE",
        Some(libc::ENFILE) => "ENFILE",
        Some(libc::ENAMETOOLONG) => "ENAMETOOLONG",
        Some(libc::EEXIST) => "EEXIST",
        Some(libc::ENOTDIR) => "ENOTDIR",
        Some(libc::EISDIR) => "EISDIR",
        Some(libc::EACCES) => "EACCES",
        Some(libc::ENOTEMPTY) => "ENOTEMPTY",
        _ => "EIO",
    };
    name.to_string()
}

#[cfg(not(unix))]
fn errno_name(_e: &io::Error) -> String {
    "EIO".to_string()
}

/// A single operation's failure, carrying enough context to render it as a
/// `status` command (`spec.md` §6.7) and, via [`Self::transmit`], whether
/// it should be sent to the remote at all rather than only logged.
#[derive(Clone, Debug)]
pub struct TransmissionError {
    /// The wire status code this error maps to.
    pub code: ErrorCode,
    /// Optional human-readable detail appended after the code (`<CODE>:<msg>`).
    pub message: Option<String>,
    /// The `file_id` this error concerns, if any.
    pub file_id: Option<String>,
    /// Whether this error should be surfaced to the remote as a `status`
    /// command, independent of the session's `quiet` level. Mirrors the
    /// Python original's `TransmissionError.transmit` flag.
    pub transmit: bool,
}

impl TransmissionError {
    /// Builds a bare error with no message, file id, or transmit override.
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            file_id: None,
            transmit: true,
        }
    }

    /// Attaches a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches the `file_id` this error concerns.
    #[must_use]
    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Marks this error as log-only: it should not be put on the wire even
    /// if the session's `quiet` level would otherwise allow it.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.transmit = false;
        self
    }

    /// A malformed command or protocol violation.
    #[must_use]
    pub fn einval(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Einval).with_message(message)
    }

    /// User confirmation (or the bypass check) refused the transfer.
    #[must_use]
    pub fn eperm() -> Self {
        Self::new(ErrorCode::Eperm)
    }

    /// Attempted to write data to a directory entry.
    #[must_use]
    pub fn eisdir(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Eisdir).with_message(message)
    }

    /// Referenced path does not exist.
    #[must_use]
    pub fn enoent(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Enoent).with_message(message)
    }

    /// Wraps a filesystem I/O failure.
    #[must_use]
    pub fn io(e: &io::Error) -> Self {
        Self::new(ErrorCode::from_io_error(e)).with_message(e.to_string())
    }

    /// Renders this error as a `status` command addressed to `session_id`.
    #[must_use]
    pub fn as_command(&self, session_id: &str) -> FileTransferCommand {
        let status = match &self.message {
            Some(msg) => format!("{}:{msg}", self.code.as_str()),
            None => self.code.as_str().to_string(),
        };
        FileTransferCommand {
            action: Action::status,
            id: session_id.to_string(),
            file_id: self.file_id.clone().unwrap_or_default(),
            status,
            ..Default::default()
        }
    }
}

impl fmt::Display for TransmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.code.as_str()),
            None => write!(f, "{}", self.code.as_str()),
        }
    }
}

impl std::error::Error for TransmissionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_command_without_message_is_bare_code() {
        let err = TransmissionError::eperm();
        let cmd = err.as_command("sess");
        assert_eq!(cmd.status, "EPERM");
        assert_eq!(cmd.id, "sess");
    }

    #[test]
    fn as_command_with_message_joins_with_colon() {
        let err = TransmissionError::einval("bad prefix").with_file_id("f1");
        let cmd = err.as_command("sess");
        assert_eq!(cmd.status, "EINVAL:bad prefix");
        assert_eq!(cmd.file_id, "f1");
    }

    #[test]
    fn silent_errors_are_not_transmitted() {
        let err = TransmissionError::einval("x").silent();
        assert!(!err.transmit);
    }
}
