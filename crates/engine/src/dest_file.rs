//! [`DestFile`]: the receiving-side per-file state machine (`spec.md` §4.2).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use compress::Decompressor;
use protocol::{Compression, FileType, TransmissionType};
use signature::PatchFile;

use crate::error::{ErrorCode, TransmissionError};

enum Writer {
    Plain(File),
    Patch(PatchFile),
}

/// A single destination-side file, directory, symlink, or hard link being
/// materialized from incoming `file`/`data`/`end_data` commands.
///
/// Directories are created (and closed) at construction time; regular files
/// and links stay open across [`Self::write_data`] calls until `is_last`.
pub struct DestFile {
    file_id: String,
    path: PathBuf,
    ftype: FileType,
    ttype: TransmissionType,
    mtime: i64,
    permissions: i64,
    link_target: Vec<u8>,
    decompressor: Decompressor,
    writer: Option<Writer>,
    rsync_block_size: Option<usize>,
    bytes_written: u64,
    closed: bool,
    failed: bool,
    needs_unlink: bool,
}

/// Facts about an existing path discovered while constructing a [`DestFile`],
/// needed by the caller to render the `STARTED`/`OK` acknowledgement.
pub struct NewFileInfo {
    /// Size of the file already at this path, if any regular file was there.
    pub existing_size: Option<u64>,
    /// The transmission type actually in effect, after the "rsync only if an
    /// existing regular file is present" downgrade (`spec.md` §4.7).
    pub effective_ttype: TransmissionType,
}

impl DestFile {
    /// Resolves `name` against `home`: absolute names are used as-is,
    /// relative ones are expanded under the home directory, and (if that
    /// somehow remains relative) under the system temp directory.
    #[must_use]
    pub fn resolve_path(name: &str, home: &Path) -> PathBuf {
        let given = Path::new(name);
        if given.is_absolute() {
            return given.to_path_buf();
        }
        let under_home = home.join(given);
        if under_home.is_absolute() {
            under_home
        } else {
            std::env::temp_dir().join(given)
        }
    }

    /// Builds a new destination file from a `file` command's already-parsed
    /// fields, creating directories eagerly and inspecting any pre-existing
    /// path at `path` for `needs_unlink`/rsync-downgrade purposes.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory's `mkdir -p` fails.
    pub fn new(
        file_id: &str,
        path: PathBuf,
        ftype: FileType,
        ttype: TransmissionType,
        compression: Compression,
        mtime: i64,
        permissions: i64,
    ) -> Result<(Self, NewFileInfo), TransmissionError> {
        let needs_unlink = path_needs_unlink(&path);
        let existing_len = fs::symlink_metadata(&path)
            .ok()
            .filter(fs::Metadata::is_file)
            .map(|m| m.len());

        if ftype == FileType::directory {
            fs::create_dir_all(&path).map_err(|e| {
                TransmissionError::io(&e).with_file_id(file_id)
            })?;
            let info = NewFileInfo {
                existing_size: None,
                effective_ttype: TransmissionType::simple,
            };
            let file = Self {
                file_id: file_id.to_string(),
                path,
                ftype,
                ttype: TransmissionType::simple,
                mtime,
                permissions,
                link_target: Vec::new(),
                decompressor: Decompressor::identity(),
                writer: None,
                rsync_block_size: None,
                bytes_written: 0,
                closed: true,
                failed: false,
                needs_unlink,
            };
            return Ok((file, info));
        }

        let effective_ttype = if ttype == TransmissionType::rsync && existing_len.is_some() {
            TransmissionType::rsync
        } else {
            TransmissionType::simple
        };
        let rsync_block_size = (effective_ttype == TransmissionType::rsync)
            .then(|| signature::block_size_for_len(existing_len.unwrap_or(0)));
        let decompressor = match compression {
            Compression::none => Decompressor::identity(),
            Compression::zlib => Decompressor::zlib(),
        };

        let info = NewFileInfo {
            existing_size: existing_len,
            effective_ttype,
        };
        let file = Self {
            file_id: file_id.to_string(),
            path,
            ftype,
            ttype: effective_ttype,
            mtime,
            permissions,
            link_target: Vec::new(),
            decompressor,
            writer: None,
            rsync_block_size,
            bytes_written: 0,
            closed: false,
            failed: false,
            needs_unlink,
        };
        Ok((file, info))
    }

    /// The `file_id` this destination file was registered under.
    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// The resolved absolute path this destination file writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The kind of filesystem entry this destination file represents.
    #[must_use]
    pub const fn ftype(&self) -> FileType {
        self.ftype
    }

    /// Whether no further writes will be accepted.
    #[must_use]
    pub const fn closed(&self) -> bool {
        self.closed
    }

    /// Whether a write previously failed (implies [`Self::closed`]).
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.failed
    }

    /// Bytes written so far (an approximation for `ttype=rsync`: the sum of
    /// decompressed delta-op bytes processed, not a true file offset).
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Marks this file as permanently failed: no further writes will be
    /// accepted and any open writer is discarded without a final flush.
    pub fn mark_failed(&mut self) {
        self.failed = true;
        self.closed = true;
        self.writer = None;
    }

    /// Dispatches one chunk of incoming `data` to this file, per
    /// `spec.md` §4.2.
    ///
    /// `all_files` is used to resolve `fid:`/`fid_abs:` link targets against
    /// sibling destination files already registered in the same session; it
    /// must not contain `self` (callers typically `remove` the target file
    /// from their map before calling, then reinsert it).
    ///
    /// # Errors
    ///
    /// Returns [`TransmissionError`] for a write to a directory or an
    /// already-closed file, a malformed link-target prefix, or any
    /// underlying filesystem failure.
    pub fn write_data(
        &mut self,
        all_files: &HashMap<String, DestFile>,
        data: &[u8],
        is_last: bool,
    ) -> Result<(), TransmissionError> {
        if self.ftype == FileType::directory {
            return Err(TransmissionError::eisdir("cannot write data to a directory")
                .with_file_id(&self.file_id));
        }
        if self.closed {
            return Err(TransmissionError::einval("Cannot write to a closed file")
                .with_file_id(&self.file_id));
        }

        match self.ftype {
            FileType::symlink | FileType::link => {
                self.link_target.extend_from_slice(data);
                if is_last {
                    self.finish_link(all_files)?;
                }
                Ok(())
            }
            FileType::regular => self.write_regular(data, is_last),
            FileType::directory => unreachable!("handled above"),
        }
    }

    fn write_regular(&mut self, data: &[u8], is_last: bool) -> Result<(), TransmissionError> {
        let decompressed = self
            .decompressor
            .decompress(data, is_last)
            .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;

        if self.writer.is_none() {
            self.open_writer()?;
        }
        self.write_to_writer(&decompressed)?;
        self.bytes_written += decompressed.len() as u64;

        if is_last {
            self.close_regular();
        }
        Ok(())
    }

    fn write_to_writer(&mut self, bytes: &[u8]) -> Result<(), TransmissionError> {
        use io::Write;
        match self.writer.as_mut().expect("writer opened above") {
            Writer::Plain(file) => file
                .write_all(bytes)
                .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id)),
            Writer::Patch(patch) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                patch
                    .apply_delta_chunk(bytes)
                    .map_err(|e| TransmissionError::io(&io::Error::other(e.to_string())).with_file_id(&self.file_id))
            }
        }
    }

    fn open_writer(&mut self) -> Result<(), TransmissionError> {
        match self.ttype {
            TransmissionType::rsync => {
                let block_size = self
                    .rsync_block_size
                    .expect("ttype=rsync implies a computed block size");
                let patch = PatchFile::new(&self.path, block_size)
                    .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
                self.writer = Some(Writer::Patch(patch));
            }
            TransmissionType::simple => {
                if self.needs_unlink {
                    let _ = fs::remove_file(&self.path);
                }
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
                }
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let mode = if self.permissions >= 0 {
                    self.permissions as u32
                } else {
                    0o644
                };
                let file = open_truncate(&self.path, mode)
                    .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
                self.writer = Some(Writer::Plain(file));
            }
        }
        Ok(())
    }

    fn close_regular(&mut self) {
        match self.writer.take() {
            Some(Writer::Plain(file)) => drop(file),
            Some(Writer::Patch(patch)) => match patch.commit() {
                Ok(written) => self.bytes_written = written,
                Err(e) => logging::log_io_error!(
                    file_id = %self.file_id,
                    path = %self.path.display(),
                    error = %e,
                    "failed to commit rsync patch"
                ),
            },
            None => {}
        }
        self.closed = true;
        if let Err(e) = self.apply_metadata() {
            logging::log_io_error!(
                file_id = %self.file_id,
                path = %self.path.display(),
                error = %e,
                "failed to apply file metadata"
            );
        }
    }

    fn finish_link(
        &mut self,
        all_files: &HashMap<String, DestFile>,
    ) -> Result<(), TransmissionError> {
        let target = resolve_link_target(&self.link_target, self.ftype, &self.path, all_files)
            .map_err(|e| e.with_file_id(&self.file_id))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
        }
        if fs::symlink_metadata(&self.path).is_ok() {
            fs::remove_file(&self.path)
                .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?;
        }

        match self.ftype {
            FileType::symlink => create_symlink(&target, &self.path)
                .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?,
            FileType::link => fs::hard_link(&target, &self.path)
                .map_err(|e| TransmissionError::io(&e).with_file_id(&self.file_id))?,
            FileType::regular | FileType::directory => unreachable!("handled by caller"),
        }
        self.closed = true;

        let result = match self.ftype {
            FileType::symlink => metadata::apply_symlink(&self.path, self.mtime, self.permissions),
            _ => metadata::apply_file(&self.path, self.mtime, self.permissions),
        };
        if let Err(e) = result {
            logging::log_io_error!(
                file_id = %self.file_id,
                path = %self.path.display(),
                error = %e,
                "failed to apply link metadata"
            );
        }
        Ok(())
    }

    /// Applies this file's mode/mtime, dispatching to the symlink-preserving
    /// variant when `ftype == symlink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `chmod`/`utime` syscall fails.
    pub fn apply_metadata(&self) -> Result<(), metadata::Error> {
        match self.ftype {
            FileType::directory => metadata::apply_dir(&self.path, self.mtime, self.permissions),
            FileType::symlink => metadata::apply_symlink(&self.path, self.mtime, self.permissions),
            FileType::regular | FileType::link => {
                metadata::apply_file(&self.path, self.mtime, self.permissions)
            }
        }
    }
}

fn path_needs_unlink(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_symlink() || nlink(&meta) > 1,
        Err(_) => false,
    }
}

#[cfg(unix)]
fn nlink(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

#[cfg(not(unix))]
fn nlink(_meta: &fs::Metadata) -> u64 {
    1
}

#[cfg(unix)]
fn open_truncate(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn open_truncate(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Rewrites `target` to be relative to `base`'s parent directory.
fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target_comps: Vec<_> = target.components().collect();
    let base_comps: Vec<_> = base.components().collect();
    let common = target_comps
        .iter()
        .zip(base_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_comps.len() {
        result.push(Component::ParentDir.as_os_str());
    }
    for comp in &target_comps[common..] {
        result.push(comp.as_os_str());
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

fn resolve_link_target(
    bytes: &[u8],
    ftype: FileType,
    path: &Path,
    files: &HashMap<String, DestFile>,
) -> Result<PathBuf, TransmissionError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| TransmissionError::einval("link target is not valid UTF-8"))?;

    if let Some(id) = text.strip_prefix("fid:") {
        let target = files
            .get(id)
            .ok_or_else(|| TransmissionError::einval(format!("unknown file_id {id} in link target")))?;
        if ftype == FileType::symlink {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            Ok(relative_to(target.path(), parent))
        } else {
            Ok(target.path().to_path_buf())
        }
    } else if let Some(id) = text.strip_prefix("fid_abs:") {
        let target = files
            .get(id)
            .ok_or_else(|| TransmissionError::einval(format!("unknown file_id {id} in link target")))?;
        Ok(target.path().to_path_buf())
    } else if let Some(literal) = text.strip_prefix("path:") {
        let normalized = literal.replace('/', std::path::MAIN_SEPARATOR_STR);
        let mut p = PathBuf::from(normalized);
        if p.is_relative() && ftype == FileType::link {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            p = parent.join(p);
        }
        Ok(p)
    } else {
        Err(TransmissionError::einval(format!(
            "unrecognised link target prefix in {text:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_keeps_absolute_names_as_is() {
        let home = Path::new("/home/user");
        assert_eq!(
            DestFile::resolve_path("/tmp/hello.txt", home),
            PathBuf::from("/tmp/hello.txt")
        );
    }

    #[test]
    fn resolve_path_expands_relative_names_under_home() {
        let home = Path::new("/home/user");
        assert_eq!(
            DestFile::resolve_path("docs/a.txt", home),
            PathBuf::from("/home/user/docs/a.txt")
        );
    }

    #[test]
    fn directory_is_created_and_closed_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub");
        let (file, info) = DestFile::new(
            "d1",
            path.clone(),
            FileType::directory,
            TransmissionType::simple,
            Compression::none,
            -1,
            -1,
        )
        .unwrap();
        assert!(file.closed());
        assert!(info.existing_size.is_none());
        assert!(path.is_dir());
    }

    #[test]
    fn regular_file_write_then_close_produces_expected_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let (mut file, info) = DestFile::new(
            "f1",
            path.clone(),
            FileType::regular,
            TransmissionType::simple,
            Compression::none,
            -1,
            0o644,
        )
        .unwrap();
        assert_eq!(info.effective_ttype, TransmissionType::simple);

        let empty = HashMap::new();
        file.write_data(&empty, b"hello", true).unwrap();
        assert!(file.closed());
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn writing_to_a_directory_fails_eisdir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub");
        let (mut file, _) = DestFile::new(
            "d1",
            path,
            FileType::directory,
            TransmissionType::simple,
            Compression::none,
            -1,
            -1,
        )
        .unwrap();
        let empty = HashMap::new();
        let err = file.write_data(&empty, b"x", true).unwrap_err();
        assert_eq!(err.code, ErrorCode::Eisdir);
    }

    #[test]
    fn writing_to_a_closed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let (mut file, _) = DestFile::new(
            "f1",
            path,
            FileType::regular,
            TransmissionType::simple,
            Compression::none,
            -1,
            0o644,
        )
        .unwrap();
        let empty = HashMap::new();
        file.write_data(&empty, b"hi", true).unwrap();
        let err = file.write_data(&empty, b"more", true).unwrap_err();
        assert_eq!(err.code, ErrorCode::Einval);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_with_path_prefix_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link");
        let (mut file, _) = DestFile::new(
            "s1",
            path.clone(),
            FileType::symlink,
            TransmissionType::simple,
            Compression::none,
            -1,
            -1,
        )
        .unwrap();
        let empty = HashMap::new();
        file.write_data(&empty, b"path:/etc/hostname", true).unwrap();
        let target = fs::read_link(&path).unwrap();
        assert_eq!(target, PathBuf::from("/etc/hostname"));
    }

    #[test]
    fn relative_to_computes_parent_relative_path() {
        let target = Path::new("/a/b/c");
        let base = Path::new("/a/d");
        assert_eq!(relative_to(target, base), PathBuf::from("../b/c"));
    }
}
