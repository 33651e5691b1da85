//! [`PatchFile`]: applies a streamed delta (see [`crate::delta_for_file`])
//! against an existing file, buffering the result in a temp file and
//! swapping it into place atomically on commit — mirroring upstream
//! rsync's patch-via-tempfile strategy so a crash or truncated transfer
//! never corrupts the original file.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Error;
use crate::wire::{decode_delta_op, DeltaOp};

/// A write sink that applies a streamed delta against an existing file.
///
/// Copy ops pull bytes from the original file at `block_index * block_size`;
/// data ops are literal bytes taken straight from the wire. Nothing touches
/// the destination path until [`Self::commit`] renames the temp file over
/// it.
pub struct PatchFile {
    dest: PathBuf,
    block_size: u64,
    original: BufReader<File>,
    tmp: BufWriter<NamedTempFile>,
}

impl PatchFile {
    /// Opens `path` for reading as the patch base and creates a temp file
    /// alongside it (same directory, so the final rename is same-filesystem
    /// and therefore atomic) to accumulate the patched output.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be opened for reading or the temp
    /// file cannot be created next to it.
    pub fn new(path: &Path, block_size: usize) -> io::Result<Self> {
        let original = File::open(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir)?;
        Ok(Self {
            dest: path.to_path_buf(),
            #[allow(clippy::cast_possible_truncation)]
            block_size: block_size as u64,
            original: BufReader::new(original),
            tmp: BufWriter::new(tmp),
        })
    }

    /// Applies one delta op chunk as produced by [`crate::delta_for_file`].
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk is malformed, or if reading the
    /// original file or writing the temp file fails.
    pub fn apply_delta_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        match decode_delta_op(chunk)? {
            DeltaOp::Copy(index) => {
                let offset = u64::from(index) * self.block_size;
                self.original.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0u8; self.block_size as usize];
                let mut total = 0usize;
                loop {
                    let read = self.original.read(&mut buf[total..])?;
                    if read == 0 {
                        break;
                    }
                    total += read;
                }
                self.tmp.write_all(&buf[..total])?;
            }
            DeltaOp::Data(bytes) => {
                self.tmp.write_all(bytes)?;
            }
        }
        Ok(())
    }

    /// Flushes the temp file and atomically renames it over the destination
    /// path, returning the final byte count written.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or the final rename fails.
    pub fn commit(self) -> io::Result<u64> {
        let tmp = self.tmp.into_inner().map_err(io::IntoInnerError::into_error)?;
        let written = tmp.as_file().metadata()?.len();
        tmp.persist(&self.dest)
            .map_err(|persist_err| persist_err.error)?;
        Ok(written)
    }
}
