//! [`delta_for_file`]: scans a (changed) file against a remote [`Signature`]
//! and lazily emits copy/literal delta ops, one wire chunk per call to
//! [`Iterator::next`].

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use checksums::strong::{Md5, StrongDigest};
use checksums::RollingChecksum;

use crate::block::Signature;
use crate::wire::{encode_copy_op, encode_data_op};

/// Minimum number of literal bytes buffered before they are flushed as a
/// `data` op, so a long run of non-matching bytes doesn't get chunked one
/// byte at a time.
const LITERAL_FLUSH_LEN: usize = 4096;

/// Lazily produces the delta op chunks needed to turn [`Signature`]'s source
/// file into the file at the path [`delta_for_file`] was given.
pub struct DeltaChunks {
    data: Vec<u8>,
    block_size: usize,
    table: HashMap<u32, Vec<(u32, [u8; 16])>>,
    pos: usize,
    literal: Vec<u8>,
    pending_copy: Option<u32>,
}

impl DeltaChunks {
    fn new(data: Vec<u8>, signature: &Signature) -> Self {
        let mut table: HashMap<u32, Vec<(u32, [u8; 16])>> = HashMap::new();
        for (index, block) in signature.blocks.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            table
                .entry(block.weak)
                .or_default()
                .push((index as u32, block.strong));
        }
        Self {
            data,
            block_size: signature.block_size.max(1),
            table,
            pos: 0,
            literal: Vec::new(),
            pending_copy: None,
        }
    }

    fn flush_literal(&mut self) -> Option<io::Result<Vec<u8>>> {
        if self.literal.is_empty() {
            return None;
        }
        let chunk = encode_data_op(&self.literal);
        self.literal.clear();
        Some(Ok(chunk))
    }
}

impl Iterator for DeltaChunks {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(index) = self.pending_copy.take() {
            return Some(Ok(encode_copy_op(index)));
        }

        loop {
            if self.pos >= self.data.len() {
                return self.flush_literal();
            }

            let remaining = self.data.len() - self.pos;
            if remaining >= self.block_size {
                let window = &self.data[self.pos..self.pos + self.block_size];
                let mut weak = RollingChecksum::new();
                weak.update(window);

                if let Some(candidates) = self.table.get(&weak.value()) {
                    let strong = Md5::digest(window);
                    if let Some(&(index, _)) = candidates.iter().find(|(_, s)| *s == strong) {
                        self.pos += self.block_size;
                        if let Some(flushed) = self.flush_literal() {
                            self.pending_copy = Some(index);
                            return Some(flushed);
                        }
                        return Some(Ok(encode_copy_op(index)));
                    }
                }
            }

            self.literal.push(self.data[self.pos]);
            self.pos += 1;
            if self.literal.len() >= LITERAL_FLUSH_LEN {
                return self.flush_literal();
            }
        }
    }
}

/// Builds a lazy chunk iterator of delta ops for `path` against `signature`.
///
/// # Errors
///
/// Returns an error if `path` cannot be read.
pub fn delta_for_file(path: &Path, signature: &Signature) -> io::Result<DeltaChunks> {
    let data = fs::read(path)?;
    Ok(DeltaChunks::new(data, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::LoadSignature;
    use crate::sig_chunks::signature_of_file;
    use std::fs::File;
    use std::io::Write;

    fn signature_for(path: &Path) -> Signature {
        let mut loader = LoadSignature::new();
        for chunk in signature_of_file(path).unwrap() {
            loader.add_chunk(&chunk.unwrap());
        }
        loader.commit().unwrap();
        loader.signature().unwrap().clone()
    }

    #[test]
    fn identical_file_produces_only_copy_ops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let mut f = File::create(&path).unwrap();
        f.write_all(&b"stable content block ".repeat(200)).unwrap();
        drop(f);

        let signature = signature_for(&path);
        let ops: Vec<Vec<u8>> = delta_for_file(&path, &signature)
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert!(!ops.is_empty());
        for op in &ops {
            assert_eq!(op[0], crate::wire::OP_COPY);
        }
    }

    #[test]
    fn wholly_different_file_produces_literal_data() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("old");
        let mut f = File::create(&old_path).unwrap();
        f.write_all(&b"AAAAAAAAAA".repeat(200)).unwrap();
        drop(f);
        let signature = signature_for(&old_path);

        let new_path = dir.path().join("new");
        let mut f = File::create(&new_path).unwrap();
        f.write_all(&b"ZZZZZZZZZZ".repeat(200)).unwrap();
        drop(f);

        let ops: Vec<Vec<u8>> = delta_for_file(&new_path, &signature)
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert!(ops.iter().all(|op| op[0] == crate::wire::OP_DATA));
        let total: usize = ops.iter().map(|op| op.len() - 1).sum();
        assert_eq!(total, 2000);
    }

    #[test]
    fn appended_tail_produces_copy_then_literal() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("old");
        let base = b"0123456789".repeat(300);
        std::fs::write(&old_path, &base).unwrap();
        let signature = signature_for(&old_path);

        let new_path = dir.path().join("new");
        let mut appended = base.clone();
        appended.extend_from_slice(b"new tail bytes");
        std::fs::write(&new_path, &appended).unwrap();

        let ops: Vec<Vec<u8>> = delta_for_file(&new_path, &signature)
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert!(ops.iter().any(|op| op[0] == crate::wire::OP_COPY));
        assert!(ops.iter().any(|op| op[0] == crate::wire::OP_DATA));
    }
}
