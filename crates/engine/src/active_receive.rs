//! [`ActiveReceive`]: session state for one inbound transfer (`spec.md`
//! §4.4, component C4).

use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use logging::Quiet;
use protocol::{Compression, FileType, TransmissionType};

use crate::dest_file::DestFile;
use crate::error::TransmissionError;

/// How long a session may sit idle before [`ActiveReceive::is_expired`]
/// reports it prunable (`spec.md` §3, §5: 10 minutes).
pub const EXPIRE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Facts about a just-started destination file an outer engine needs to
/// build the `STARTED`/`OK` acknowledgement, without holding a borrow of
/// the [`DestFile`] itself.
pub struct StartedFile {
    /// The resolved absolute path the file will be written to.
    pub path: PathBuf,
    /// The kind of filesystem entry being started.
    pub ftype: FileType,
    /// Size of a pre-existing file at this path, if any.
    pub existing_size: Option<u64>,
    /// The transmission type actually in effect after the rsync-downgrade
    /// rule (`spec.md` §4.7: rsync only survives if an existing regular
    /// file was found).
    pub effective_ttype: TransmissionType,
}

/// Outcome of [`ActiveReceive::add_data`], distinguishing "this file had
/// already failed and the chunk was silently dropped" from a successful
/// write, so the caller can decide whether to emit `PROGRESS`/`OK`.
pub enum DataOutcome {
    /// The destination file previously failed; the chunk was dropped
    /// without further action (`spec.md` §4.4 `add_data`).
    AlreadyFailed,
    /// The chunk was applied successfully.
    Written {
        /// Total bytes written to the destination so far.
        bytes_written: u64,
        /// Whether this write closed the file (`is_last` was set).
        closed: bool,
        /// Whether `bytes_written` increased from before this call.
        progressed: bool,
    },
}

/// Session state for one inbound transfer: the remote is sending files,
/// this host is writing them to disk.
pub struct ActiveReceive {
    id: String,
    quiet: Quiet,
    bypass_ok: Option<bool>,
    accepted: bool,
    files: HashMap<String, DestFile>,
    last_activity_at: Instant,
}

impl ActiveReceive {
    /// Creates a new, not-yet-accepted receive session.
    ///
    /// `bypass_ok` is computed by the caller (the root engine, which owns
    /// the bypass passphrase and the `sha256` comparison, `spec.md` §4.4)
    /// from the command's `pw` field: `None` if no bypass token was
    /// offered, `Some(true)`/`Some(false)` if one was and it did/didn't
    /// match.
    #[must_use]
    pub fn new(id: impl Into<String>, quiet: i64, bypass_ok: Option<bool>) -> Self {
        Self {
            id: id.into(),
            quiet: Quiet::from_wire(quiet),
            bypass_ok,
            accepted: false,
            files: HashMap::new(),
            last_activity_at: Instant::now(),
        }
    }

    /// The session id this receive is registered under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// This session's wire `quiet` level.
    #[must_use]
    pub const fn quiet(&self) -> Quiet {
        self.quiet
    }

    /// The bypass check computed at construction, if a bypass token was
    /// offered.
    #[must_use]
    pub const fn bypass_ok(&self) -> Option<bool> {
        self.bypass_ok
    }

    /// Whether the user (or a matching bypass) has approved this transfer.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.accepted
    }

    /// Records the user's (or bypass's) confirmation decision.
    pub fn set_accepted(&mut self, accepted: bool) {
        self.accepted = accepted;
    }

    /// Refreshes the idle-expiry clock; called on every command addressed
    /// to this session.
    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    /// Whether this session has been idle longer than [`EXPIRE_AFTER`].
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.last_activity_at.elapsed() > EXPIRE_AFTER
    }

    /// The destination files registered in this session so far.
    #[must_use]
    pub const fn files(&self) -> &HashMap<String, DestFile> {
        &self.files
    }

    /// Starts a new destination file (or directory) from a `file` command's
    /// already-parsed fields (`spec.md` §4.4 `start_file`).
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if `file_id` is already registered in this session,
    /// or whatever [`DestFile::new`] reports (e.g. a failed `mkdir -p`).
    pub fn start_file(
        &mut self,
        file_id: &str,
        name: &str,
        home: &Path,
        ftype: FileType,
        ttype: TransmissionType,
        compression: Compression,
        mtime: i64,
        permissions: i64,
    ) -> Result<StartedFile, TransmissionError> {
        self.touch();
        if self.files.contains_key(file_id) {
            return Err(TransmissionError::einval(format!(
                "the file_id {file_id} already exists"
            ))
            .with_file_id(file_id));
        }
        let path = DestFile::resolve_path(name, home);
        let (file, info) =
            DestFile::new(file_id, path, ftype, ttype, compression, mtime, permissions)?;
        let started = StartedFile {
            path: file.path().to_path_buf(),
            ftype: file.ftype(),
            existing_size: info.existing_size,
            effective_ttype: info.effective_ttype,
        };
        self.files.insert(file_id.to_string(), file);
        Ok(started)
    }

    /// Applies one `data`/`end_data` chunk to a previously-started
    /// destination file (`spec.md` §4.4 `add_data`).
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if `file_id` was never started. A write failure is
    /// also returned as an error (and the file is marked permanently
    /// failed), but a chunk addressed to an *already*-failed file is not an
    /// error: it reports [`DataOutcome::AlreadyFailed`] instead.
    pub fn add_data(
        &mut self,
        file_id: &str,
        data: &[u8],
        is_last: bool,
    ) -> Result<DataOutcome, TransmissionError> {
        self.touch();
        let mut file = self.files.remove(file_id).ok_or_else(|| {
            TransmissionError::einval("cannot write to a file without first starting it")
                .with_file_id(file_id)
        })?;

        if file.failed() {
            self.files.insert(file_id.to_string(), file);
            return Ok(DataOutcome::AlreadyFailed);
        }

        let before = file.bytes_written();
        let result = file.write_data(&self.files, data, is_last);
        match result {
            Ok(()) => {
                let bytes_written = file.bytes_written();
                let closed = file.closed();
                self.files.insert(file_id.to_string(), file);
                Ok(DataOutcome::Written {
                    bytes_written,
                    closed,
                    progressed: bytes_written > before,
                })
            }
            Err(e) => {
                file.mark_failed();
                self.files.insert(file_id.to_string(), file);
                Err(e)
            }
        }
    }

    /// Reapplies directory metadata after every contained entry has already
    /// been written, longest path first so a parent is set after its
    /// children (`spec.md` §4.4 `commit`). OS errors are swallowed: the
    /// directory's `OK` ack has already been sent by the time `finish`
    /// triggers this.
    pub fn commit(&mut self) {
        let mut dirs: Vec<&DestFile> = self
            .files
            .values()
            .filter(|f| f.ftype() == FileType::directory)
            .collect();
        dirs.sort_by_key(|f| Reverse(f.path().as_os_str().len()));
        for dir in dirs {
            if let Err(e) = dir.apply_metadata() {
                logging::log_io_error!(
                    session_id = %self.id,
                    path = %dir.path().display(),
                    error = %e,
                    "failed to commit directory metadata"
                );
            }
        }
    }

    /// Drops every destination file this session holds open, closing their
    /// underlying file handles without unlinking anything already written
    /// (`spec.md` §5: cancellation, expiry, and engine teardown all close
    /// rather than roll back).
    pub fn close(&mut self) {
        self.files.clear();
    }
}
