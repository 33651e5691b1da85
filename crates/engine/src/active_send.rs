//! [`ActiveSend`]: session state for one outbound transfer (`spec.md`
//! §4.5, component C5).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use protocol::{Action, Compression, FileTransferCommand, TransmissionType};

use crate::active_receive::EXPIRE_AFTER;
use crate::error::TransmissionError;
use crate::source_file::SourceFile;

/// How many `file` spec commands may be queued before `spec_complete`
/// arrives (`spec.md` §4.5: 8192).
pub const MAX_SPEC_ENTRIES: usize = 8192;

/// How many source files may be open at once in a single session
/// (`spec.md` §4.5: 32768).
pub const MAX_SEND_FILES: usize = 32_768;

/// Maximum size of one outgoing `data` chunk's wire payload, before
/// base64/OSC framing (`spec.md` §4.5, §6: 4096 bytes).
pub const WIRE_CHUNK_SIZE: usize = 4096;

/// One `file` command collected during the spec-collection phase, reduced
/// to the fields [`ActiveSend::add_send_file`] needs.
#[derive(Clone, Debug)]
struct SpecEntry {
    file_id: String,
    path: PathBuf,
}

/// Session state for one outbound transfer: this host is reading files
/// from disk and streaming them to the remote.
pub struct ActiveSend {
    id: String,
    accepted: bool,
    spec_complete: bool,
    specs: Vec<SpecEntry>,
    files: HashMap<String, SourceFile>,
    pending_chunks: VecDeque<FileTransferCommand>,
    last_activity_at: Instant,
}

impl ActiveSend {
    /// Creates a new, not-yet-accepted send session.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            accepted: false,
            spec_complete: false,
            specs: Vec::new(),
            files: HashMap::new(),
            pending_chunks: VecDeque::new(),
            last_activity_at: Instant::now(),
        }
    }

    /// The session id this send is registered under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
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

    /// Whether `spec_complete` has already been received; the outer engine
    /// must not start emitting `file` acknowledgements or metadata before
    /// this is `true` (`spec.md` §4.5).
    #[must_use]
    pub const fn spec_complete(&self) -> bool {
        self.spec_complete
    }

    /// Refreshes the idle-expiry clock.
    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    /// Whether this session has been idle longer than [`EXPIRE_AFTER`].
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.last_activity_at.elapsed() > EXPIRE_AFTER
    }

    /// Registers one `file` spec entry named by the remote's `send`
    /// request (`spec.md` §4.5 `add_file_spec`).
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` once [`MAX_SPEC_ENTRIES`] has already been reached,
    /// or if `spec_complete` was already received.
    pub fn add_file_spec(
        &mut self,
        file_id: &str,
        path: PathBuf,
    ) -> Result<(), TransmissionError> {
        self.touch();
        if self.spec_complete {
            return Err(TransmissionError::einval(
                "cannot add a file spec after spec_complete",
            )
            .with_file_id(file_id));
        }
        if self.specs.len() >= MAX_SPEC_ENTRIES {
            return Err(TransmissionError::einval(format!(
                "too many file specs in one session (max {MAX_SPEC_ENTRIES})"
            ))
            .with_file_id(file_id));
        }
        self.specs.push(SpecEntry {
            file_id: file_id.to_string(),
            path,
        });
        Ok(())
    }

    /// Marks the spec-collection phase finished; no further
    /// [`Self::add_file_spec`] calls are accepted afterwards.
    pub fn mark_spec_complete(&mut self) {
        self.spec_complete = true;
    }

    /// The file specs collected so far, as `(file_id, path)` pairs, for the
    /// outer engine to hand to the metadata walker.
    #[must_use]
    pub fn pending_specs(&self) -> Vec<(String, PathBuf)> {
        self.specs
            .iter()
            .map(|s| (s.file_id.clone(), s.path.clone()))
            .collect()
    }

    /// Opens a source file for sending (`spec.md` §4.5 `add_send_file`),
    /// called once the remote requests the body of a file previously
    /// announced via metadata.
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if `file_id` is already open, or once
    /// [`MAX_SEND_FILES`] concurrently-open files has already been
    /// reached, or whatever [`SourceFile::new`] reports.
    pub fn add_send_file(
        &mut self,
        file_id: &str,
        path: PathBuf,
        ttype: TransmissionType,
        compression: Compression,
    ) -> Result<(), TransmissionError> {
        self.touch();
        if self.files.contains_key(file_id) {
            return Err(TransmissionError::einval(format!(
                "the file_id {file_id} is already open for sending"
            ))
            .with_file_id(file_id));
        }
        if self.files.len() >= MAX_SEND_FILES {
            return Err(TransmissionError::einval(format!(
                "too many concurrently open send files (max {MAX_SEND_FILES})"
            ))
            .with_file_id(file_id));
        }
        let file = SourceFile::new(file_id, path, ttype, compression)?;
        self.files.insert(file_id.to_string(), file);
        Ok(())
    }

    /// Appends one incoming signature chunk to the named source file
    /// (`spec.md` §4.5 `add_signature_data`).
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if `file_id` is not open, or if it is not
    /// currently waiting for a signature (either it isn't an rsync
    /// transfer, or its signature was already committed).
    pub fn add_signature_data(
        &mut self,
        file_id: &str,
        data: &[u8],
        is_last: bool,
    ) -> Result<(), TransmissionError> {
        self.touch();
        let file = self.files.get_mut(file_id).ok_or_else(|| {
            TransmissionError::einval("signature data for an unopened file")
                .with_file_id(file_id)
        })?;
        if !file.waiting_for_signature() {
            return Err(TransmissionError::einval(
                "signature data for a file that is not using rsync",
            )
            .with_file_id(file_id));
        }
        file.add_signature_chunk(data);
        if is_last {
            file.commit_signature()?;
        }
        Ok(())
    }

    /// Requeues a chunk the host's [`crate::Writer`]-equivalent could not
    /// accept (backpressure), to be retried before any newly-produced
    /// chunk (`spec.md` §5 `appendleft` semantics).
    pub fn return_chunk(&mut self, chunk: FileTransferCommand) {
        self.pending_chunks.push_front(chunk);
    }

    /// Produces the next outgoing `data`/`end_data` command to write to
    /// the remote, pulling from the pending-retry queue first and only
    /// then from whichever open source file is ready to transmit
    /// (`spec.md` §4.5 `next_chunk`).
    ///
    /// Returns `None` once every open file has been fully transmitted and
    /// no chunk is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if pulling the next chunk from a source file
    /// fails (I/O error, delta-stream error).
    pub fn next_chunk(&mut self) -> Result<Option<FileTransferCommand>, TransmissionError> {
        if let Some(chunk) = self.pending_chunks.pop_front() {
            return Ok(Some(chunk));
        }

        let Some(file_id) = self
            .files
            .values()
            .find(|f| f.ready_to_transmit())
            .map(|f| f.file_id().to_string())
        else {
            return Ok(None);
        };

        let file = self
            .files
            .get_mut(&file_id)
            .expect("file_id was just looked up from self.files");
        let (bytes, _uncompressed_len) = file.next_chunk(WIRE_CHUNK_SIZE)?;
        let end_data = file.transmitted();

        let mut pieces = split_for_transfer(&bytes, WIRE_CHUNK_SIZE);
        if pieces.is_empty() {
            pieces.push(Vec::new());
        }
        let last_index = pieces.len() - 1;
        for (i, piece) in pieces.into_iter().enumerate() {
            let is_final_piece = i == last_index;
            self.pending_chunks.push_back(FileTransferCommand {
                action: if is_final_piece && end_data {
                    Action::end_data
                } else {
                    Action::data
                },
                id: self.id.clone(),
                file_id: file_id.clone(),
                data: piece,
                ..Default::default()
            });
        }

        if end_data {
            self.files.remove(&file_id);
        }

        Ok(self.pending_chunks.pop_front())
    }

    /// Drops every open source file, ending the session without producing
    /// any further chunks.
    pub fn close(&mut self) {
        self.files.clear();
        self.pending_chunks.clear();
    }
}

/// Splits a single produced (already compressed) chunk into wire-sized
/// pieces of at most `max_size` bytes each, so one `next_chunk` call never
/// has to emit an oversized OSC payload (`spec.md` §4.5/§6).
fn split_for_transfer(data: &[u8], max_size: usize) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return Vec::new();
    }
    data.chunks(max_size.max(1)).map(<[u8]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn spec_entries_are_capped() {
        let mut send = ActiveSend::new("s1");
        // Not exhaustive over MAX_SPEC_ENTRIES for test speed; checks the
        // boundary condition directly instead.
        for i in 0..MAX_SPEC_ENTRIES {
            send.specs.push(SpecEntry {
                file_id: i.to_string(),
                path: PathBuf::from(i.to_string()),
            });
        }
        let err = send
            .add_file_spec("overflow", PathBuf::from("x"))
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Einval);
    }

    #[test]
    fn add_file_spec_after_complete_is_rejected() {
        let mut send = ActiveSend::new("s1");
        send.mark_spec_complete();
        let err = send.add_file_spec("f1", PathBuf::from("x")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Einval);
    }

    #[test]
    fn signature_data_for_non_rsync_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello").unwrap();
        let mut send = ActiveSend::new("s1");
        send.add_send_file("f1", path, TransmissionType::simple, Compression::none)
            .unwrap();
        let err = send.add_signature_data("f1", b"sig", true).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Einval);
    }

    #[test]
    fn next_chunk_drains_pending_queue_before_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hi").unwrap();
        let mut send = ActiveSend::new("s1");
        send.add_send_file("f1", path, TransmissionType::simple, Compression::none)
            .unwrap();

        let requeued = FileTransferCommand {
            action: Action::data,
            id: "s1".to_string(),
            file_id: "retry".to_string(),
            ..Default::default()
        };
        send.return_chunk(requeued);

        let first = send.next_chunk().unwrap().unwrap();
        assert_eq!(first.file_id, "retry");
    }

    #[test]
    fn small_file_produces_end_data_and_then_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hi").unwrap();
        let mut send = ActiveSend::new("s1");
        send.add_send_file("f1", path, TransmissionType::simple, Compression::none)
            .unwrap();

        let chunk = send.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.action, Action::end_data);
        assert_eq!(chunk.data, b"hi");
        assert!(send.next_chunk().unwrap().is_none());
    }
}
