//! [`SourceFile`]: the sending-side per-file state machine (`spec.md` §4.3).

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use compress::zlib::CompressionLevel;
use compress::Compressor;
use protocol::{Compression, TransmissionType};
use signature::{DeltaChunks, LoadSignature};

use crate::error::TransmissionError;

enum Body {
    /// A symlink's `readlink()` target, returned whole on the first call.
    SymlinkTarget(Option<Vec<u8>>),
    /// An open regular file, read incrementally.
    Regular(File),
}

/// A single source-side file or symlink being streamed out to the remote.
pub struct SourceFile {
    file_id: String,
    path: PathBuf,
    ttype: TransmissionType,
    body: Body,
    compressor: Compressor,
    signature_loader: Option<LoadSignature>,
    delta_loader: Option<DeltaChunks>,
    waiting_for_signature: bool,
    transmitted: bool,
}

impl SourceFile {
    /// Opens `path` (without following a top-level symlink) for sending.
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` for a directory or any entry kind that is neither a
    /// regular file nor a symlink, and a wrapped I/O error if the path
    /// cannot be statted or opened.
    pub fn new(
        file_id: &str,
        path: PathBuf,
        ttype: TransmissionType,
        compression: Compression,
    ) -> Result<Self, TransmissionError> {
        let meta = fs::symlink_metadata(&path)
            .map_err(|e| TransmissionError::io(&e).with_file_id(file_id))?;

        if meta.is_dir() {
            return Err(TransmissionError::einval("cannot send a directory as a file body")
                .with_file_id(file_id));
        }

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&path)
                .map_err(|e| TransmissionError::io(&e).with_file_id(file_id))?;
            return Ok(Self {
                file_id: file_id.to_string(),
                path,
                ttype: TransmissionType::simple,
                body: Body::SymlinkTarget(Some(path_to_bytes(&target))),
                compressor: Compressor::identity(),
                signature_loader: None,
                delta_loader: None,
                waiting_for_signature: false,
                transmitted: false,
            });
        }

        if !meta.is_file() {
            return Err(TransmissionError::einval("unsupported source file type")
                .with_file_id(file_id));
        }

        let file =
            File::open(&path).map_err(|e| TransmissionError::io(&e).with_file_id(file_id))?;
        let compressor = match compression {
            Compression::none => Compressor::identity(),
            Compression::zlib => Compressor::zlib(CompressionLevel::Default),
        };
        let waiting_for_signature = ttype == TransmissionType::rsync;

        Ok(Self {
            file_id: file_id.to_string(),
            path,
            ttype,
            body: Body::Regular(file),
            compressor,
            signature_loader: waiting_for_signature.then(LoadSignature::new),
            delta_loader: None,
            waiting_for_signature,
            transmitted: false,
        })
    }

    /// The `file_id` this source file is registered under.
    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Whether this file is ready to produce body chunks: not yet fully
    /// transmitted, and (for rsync files) the delta stream has been built
    /// from a committed signature.
    #[must_use]
    pub const fn ready_to_transmit(&self) -> bool {
        !self.transmitted && !self.waiting_for_signature
    }

    /// Whether this file was constructed for rsync delta transfer and is
    /// still waiting for its signature to be delivered and committed.
    ///
    /// A `data`/`end_data` signature chunk addressed to a file for which
    /// this is `false` is a protocol error (`spec.md` §4.5): either the
    /// file isn't using rsync at all, or its signature was already
    /// committed.
    #[must_use]
    pub const fn waiting_for_signature(&self) -> bool {
        self.waiting_for_signature
    }

    /// Whether every chunk of this file's body has already been produced.
    #[must_use]
    pub const fn transmitted(&self) -> bool {
        self.transmitted
    }

    /// Appends one chunk of incoming signature bytes (`spec.md` §4.5,
    /// `add_signature_data`).
    pub fn add_signature_chunk(&mut self, chunk: &[u8]) {
        if let Some(loader) = self.signature_loader.as_mut() {
            loader.add_chunk(chunk);
        }
    }

    /// Commits the accumulated signature and builds the delta iterator
    /// against this file's own path, clearing [`Self::waiting_for_signature`].
    ///
    /// # Errors
    ///
    /// Returns an error if the accumulated signature bytes are malformed or
    /// empty, or if the source path cannot be re-read to compute the delta.
    pub fn commit_signature(&mut self) -> Result<(), TransmissionError> {
        let loader = self.signature_loader.as_mut().ok_or_else(|| {
            TransmissionError::einval("no signature was requested for this file")
                .with_file_id(&self.file_id)
        })?;
        loader
            .commit()
            .map_err(|e| TransmissionError::einval(e.to_string()).with_file_id(&self.file_id))?;
        let signature = loader
            .signature()
            .expect("commit() succeeded above")
            .clone();
        let delta = signature::delta_for_file(&self.path, &signature)
            .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
        self.delta_loader = Some(delta);
        self.waiting_for_signature = false;
        Ok(())
    }

    /// Produces the next body chunk as `(wire_bytes, uncompressed_len)`.
    ///
    /// Returns an empty chunk exactly once as the file's body is exhausted,
    /// at which point the compressor is flushed and the file handle closed;
    /// every call after that also returns an empty chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the source file, pulling the next delta
    /// op, or driving the compressor fails.
    pub fn next_chunk(&mut self, max_size: usize) -> Result<(Vec<u8>, usize), TransmissionError> {
        if self.transmitted {
            return Ok((Vec::new(), 0));
        }

        if let Body::SymlinkTarget(target) = &mut self.body {
            let bytes = target.take().unwrap_or_default();
            self.transmitted = true;
            let len = bytes.len();
            return Ok((bytes, len));
        }

        let mut uncompressed_len = 0;
        let mut out = Vec::new();
        loop {
            let raw = self.pull_raw(max_size)?;
            uncompressed_len += raw.len();
            if raw.is_empty() {
                self.transmitted = true;
            }

            out.extend(
                self.compressor
                    .compress(&raw)
                    .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?,
            );

            if self.transmitted {
                let flushed = self
                    .compressor
                    .flush()
                    .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
                out.extend(flushed);
                self.close();
                break;
            }

            if !out.is_empty() {
                break;
            }
        }
        Ok((out, uncompressed_len))
    }

    fn pull_raw(&mut self, max_size: usize) -> Result<Vec<u8>, TransmissionError> {
        if self.ttype == TransmissionType::rsync {
            let loader = self.delta_loader.as_mut().ok_or_else(|| {
                TransmissionError::einval("rsync source file has no delta stream yet")
                    .with_file_id(&self.file_id)
            })?;
            match loader.next() {
                Some(Ok(chunk)) => Ok(chunk),
                Some(Err(e)) => Err(TransmissionError::io(&e).with_file_id(&self.file_id)),
                None => Ok(Vec::new()),
            }
        } else {
            let Body::Regular(file) = &mut self.body else {
                unreachable!("non-symlink source files always hold a regular file handle")
            };
            let mut buf = vec![0u8; max_size.max(1)];
            let read = file
                .read(&mut buf)
                .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
            buf.truncate(read);
            Ok(buf)
        }
    }

    fn close(&mut self) {
        if let Body::Regular(_) = &self.body {
            self.body = Body::SymlinkTarget(None);
        }
    }
}

#[cfg(unix)]
fn path_to_bytes(p: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    p.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_to_bytes(p: &Path) -> Vec<u8> {
    p.to_string_lossy().into_owned().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_file_transmits_then_signals_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello world").unwrap();

        let mut source =
            SourceFile::new("f1", path, TransmissionType::simple, Compression::none).unwrap();
        assert!(source.ready_to_transmit());

        let (chunk, len) = source.next_chunk(4096).unwrap();
        assert_eq!(chunk, b"hello world");
        assert_eq!(len, 11);
        assert!(!source.transmitted());

        let (chunk, len) = source.next_chunk(4096).unwrap();
        assert!(chunk.is_empty());
        assert_eq!(len, 0);
        assert!(source.transmitted());
    }

    #[test]
    fn small_max_size_splits_into_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"0123456789").unwrap();

        let mut source =
            SourceFile::new("f1", path, TransmissionType::simple, Compression::none).unwrap();
        let mut collected = Vec::new();
        loop {
            let (chunk, _) = source.next_chunk(3).unwrap();
            if chunk.is_empty() && source.transmitted() {
                break;
            }
            collected.extend(chunk);
        }
        assert_eq!(collected, b"0123456789");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_source_returns_target_in_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut source =
            SourceFile::new("s1", link, TransmissionType::simple, Compression::none).unwrap();
        let (chunk, len) = source.next_chunk(4096).unwrap();
        assert_eq!(chunk, path_to_bytes(&target));
        assert_eq!(len, chunk.len());
        assert!(source.transmitted());
    }

    #[test]
    fn directory_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceFile::new(
            "d1",
            dir.path().to_path_buf(),
            TransmissionType::simple,
            Compression::none,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Einval);
    }
}
