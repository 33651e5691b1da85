//! The block list a [`Signature`] is built from, and the adaptive block-size
//! heuristic used to derive it from a file's length.

/// Smallest block size this implementation will ever choose, regardless of
/// file length — below this the per-block checksum overhead swamps any
/// savings from matching blocks.
pub const MIN_BLOCK_SIZE: usize = 700;

/// Largest block size this implementation will ever choose.
pub const MAX_BLOCK_SIZE: usize = 1 << 17;

/// Derives a block size for a file of `len` bytes.
///
/// Mirrors upstream rsync's adaptive heuristic: block size scales with the
/// square root of the file length, so the signature (block count × per-block
/// checksum size) stays roughly proportional to `sqrt(len)` rather than
/// growing linearly with it.
#[must_use]
pub fn block_size_for_len(len: u64) -> usize {
    if len == 0 {
        return MIN_BLOCK_SIZE;
    }
    // sqrt() on a u64 cast to f64 loses precision only for files far larger
    // than anything this engine transmits a signature for.
    #[allow(clippy::cast_precision_loss)]
    let sqrt = (len as f64).sqrt() as usize;
    sqrt.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
}

/// Weak + strong checksum pair for one fixed-size block of a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignatureBlock {
    /// Rolling (`rsum`) checksum of the block.
    pub weak: u32,
    /// Strong MD5 digest of the block, confirming a weak-checksum match.
    pub strong: [u8; 16],
}

/// The block list of an existing file, used to compute a delta against a
/// newer version of the same file without transferring it whole.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Signature {
    /// Fixed block size every entry in [`Self::blocks`] (other than
    /// possibly the last) was computed over.
    pub block_size: usize,
    /// Length of the file the signature was computed from, needed to derive
    /// the length of the final (possibly short) block.
    pub file_len: u64,
    /// Per-block checksum pairs, in file order.
    pub blocks: Vec<SignatureBlock>,
}

impl Signature {
    /// Number of blocks in the signature.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the signature carries no blocks (an empty source file).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Length in bytes of the block at `index`, accounting for a short final
    /// block.
    #[must_use]
    pub fn block_len(&self, index: usize) -> u64 {
        let block_size = self.block_size as u64;
        let start = block_size * index as u64;
        self.file_len.saturating_sub(start).min(block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gets_minimum_block_size() {
        assert_eq!(block_size_for_len(0), MIN_BLOCK_SIZE);
    }

    #[test]
    fn small_file_gets_minimum_block_size() {
        assert_eq!(block_size_for_len(1000), MIN_BLOCK_SIZE);
    }

    #[test]
    fn huge_file_is_clamped_to_maximum() {
        assert_eq!(block_size_for_len(u64::MAX), MAX_BLOCK_SIZE);
    }

    #[test]
    fn mid_size_file_scales_with_square_root() {
        // 100_000_000 bytes -> sqrt ~= 10_000, within the clamp range.
        assert_eq!(block_size_for_len(100_000_000), 10_000);
    }

    #[test]
    fn block_len_accounts_for_short_final_block() {
        let sig = Signature {
            block_size: 10,
            file_len: 25,
            blocks: vec![
                SignatureBlock { weak: 0, strong: [0; 16] };
                3
            ],
        };
        assert_eq!(sig.block_len(0), 10);
        assert_eq!(sig.block_len(1), 10);
        assert_eq!(sig.block_len(2), 5);
    }
}
