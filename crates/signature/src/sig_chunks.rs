//! [`signature_of_file`]: a lazy, pull-driven producer of a file's signature
//! bytes, one fixed-size block per call to [`Iterator::next`] so the caller
//! (the engine's send-side timer pump, §5) never blocks on hashing a whole
//! file in one step.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use checksums::strong::{Md5, StrongDigest};
use checksums::RollingChecksum;

use crate::block::{block_size_for_len, SignatureBlock};
use crate::wire::{encode_block, encode_header};

/// Lazily produces the byte chunks of a file's rsync signature: one header
/// chunk, then one block-record chunk per fixed-size block of the file.
pub struct SignatureChunks {
    reader: BufReader<File>,
    block_size: usize,
    remaining: u64,
    header_sent: bool,
}

impl SignatureChunks {
    fn new(file: File, len: u64) -> Self {
        let block_size = block_size_for_len(len);
        Self {
            reader: BufReader::new(file),
            block_size,
            remaining: len,
            header_sent: false,
        }
    }
}

impl Iterator for SignatureChunks {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.header_sent {
            self.header_sent = true;
            let total_len = self.remaining;
            return Some(Ok(encode_header(self.block_size, total_len).to_vec()));
        }

        if self.remaining == 0 {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let take = self.block_size.min(self.remaining as usize);
        let mut buf = vec![0u8; take];
        if let Err(e) = self.reader.read_exact(&mut buf) {
            return Some(Err(e));
        }
        self.remaining -= take as u64;

        let mut weak = RollingChecksum::new();
        weak.update(&buf);
        let strong = Md5::digest(&buf);
        let block = SignatureBlock {
            weak: weak.value(),
            strong,
        };
        Some(Ok(encode_block(&block).to_vec()))
    }
}

/// Builds a lazy chunk iterator over the rsync signature of the file at
/// `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its metadata cannot be
/// read.
pub fn signature_of_file(path: &Path) -> io::Result<SignatureChunks> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok(SignatureChunks::new(file, len))
}
