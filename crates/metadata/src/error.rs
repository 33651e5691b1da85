use thiserror::Error;

/// Errors produced while applying permissions or timestamps to a
/// destination path.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying `chmod`/`utime` syscall failed for a reason other
    /// than "this platform doesn't support the link-preserving variant"
    /// (which callers swallow per `spec.md` §4.2).
    #[error("failed to apply metadata to {path}: {source}")]
    Io {
        /// Path the operation was attempted against.
        path: std::path::PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
