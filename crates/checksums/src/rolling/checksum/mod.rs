#[cfg(target_arch = "aarch64")]
pub(crate) mod neon;
#[cfg(test)]
mod tests;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) mod x86;

use super::digest::RollingDigest;
use super::error::RollingError;

/// Rolling checksum used by rsync for weak block matching (often called `rsum`).
///
/// Mirrors upstream rsync's Adler-32 style weak checksum: `s1` accumulates the byte sum,
/// `s2` accumulates prefix sums, both truncated to 16 bits.
///
/// # Upstream Reference
///
/// - `checksum.c:82` - `get_checksum1()` - Rolling checksum computation
/// - `match.c:39` - `build_hash_table()` - Block hash table construction
/// - `match.c:193` - `hash_search()` - Fast block lookup using rolling checksum
///
/// This implementation provides CPU-accelerated SIMD variants (AVX2, SSE2, NEON)
/// with scalar fallback, maintaining byte-for-byte compatibility with upstream.
#[doc(alias = "rsum")]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RollingChecksum {
    s1: u32,
    s2: u32,
    len: usize,
}

impl RollingChecksum {
    /// Creates a new rolling checksum with zeroed state.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::RollingChecksum;
    ///
    /// let mut checksum = RollingChecksum::new();
    /// assert!(checksum.is_empty());
    /// assert_eq!(checksum.len(), 0);
    /// ```
    #[must_use]
    pub const fn new() -> Self {
        Self {
            s1: 0,
            s2: 0,
            len: 0,
        }
    }

    /// Resets the checksum back to its initial state.
    pub const fn reset(&mut self) {
        self.s1 = 0;
        self.s2 = 0;
        self.len = 0;
    }

    /// Returns the number of bytes that contributed to the current state.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes have been observed yet.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Updates the checksum with an additional slice of bytes.
    ///
    /// This is the primary method for computing checksums over data blocks.
    /// SIMD acceleration (AVX2/SSE2/NEON) is used when available.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::RollingChecksum;
    ///
    /// let mut checksum = RollingChecksum::new();
    /// checksum.update(b"Hello, ");
    /// checksum.update(b"rsync!");
    ///
    /// // Equivalent to computing over the full block
    /// let mut full = RollingChecksum::new();
    /// full.update(b"Hello, rsync!");
    /// assert_eq!(checksum.value(), full.value());
    /// ```
    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        let (s1, s2, len) = accumulate_chunk_dispatch(self.s1, self.s2, self.len, chunk);
        self.s1 = s1;
        self.s2 = s2;
        self.len = len;
    }

    /// Clears the state and updates with `block`.
    pub fn update_from_block(&mut self, block: &[u8]) {
        self.reset();
        self.update(block);
    }

    /// Returns the current window length as a 32-bit value while validating invariants.
    #[inline]
    fn window_len_u32(&self) -> Result<u32, RollingError> {
        if self.len == 0 {
            return Err(RollingError::EmptyWindow);
        }
        u32::try_from(self.len).map_err(|_| RollingError::WindowTooLarge { len: self.len })
    }

    /// Rolls the checksum by removing one byte and adding another.
    ///
    /// This enables O(1) sliding window updates for delta detection.
    /// The window size remains constant after rolling.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::RollingChecksum;
    ///
    /// let data = b"ABCDE";
    /// let block_size = 3;
    ///
    /// // Compute checksum for "ABC"
    /// let mut rolling = RollingChecksum::new();
    /// rolling.update(&data[0..3]); // "ABC"
    ///
    /// // Roll window: remove 'A', add 'D' -> now covers "BCD"
    /// rolling.roll(data[0], data[3]).unwrap();
    ///
    /// // Verify it matches fresh computation of "BCD"
    /// let mut fresh = RollingChecksum::new();
    /// fresh.update(&data[1..4]); // "BCD"
    /// assert_eq!(rolling.value(), fresh.value());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RollingError::EmptyWindow`] if no bytes have been processed.
    #[inline]
    pub fn roll(&mut self, outgoing: u8, incoming: u8) -> Result<(), RollingError> {
        let window_len = self.window_len_u32()?;

        let out = u32::from(outgoing);
        let inn = u32::from(incoming);

        let new_s1 = self.s1.wrapping_sub(out).wrapping_add(inn) & 0xffff;
        let new_s2 = self
            .s2
            .wrapping_sub(window_len.wrapping_mul(out))
            .wrapping_add(new_s1)
            & 0xffff;

        self.s1 = new_s1;
        self.s2 = new_s2;
        Ok(())
    }

    /// Returns the rolling checksum value in rsync's packed 32-bit representation.
    ///
    /// The format is `(s2 << 16) | s1`, matching upstream rsync's wire format.
    /// Use this value for hash table lookups during delta detection.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::RollingChecksum;
    ///
    /// let mut checksum = RollingChecksum::new();
    /// checksum.update(b"test data");
    ///
    /// let packed = checksum.value();
    /// // Upper 16 bits: s2 (weighted sum)
    /// // Lower 16 bits: s1 (byte sum)
    /// let s1 = packed & 0xFFFF;
    /// let s2 = packed >> 16;
    /// ```
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u32 {
        (self.s2 << 16) | self.s1
    }

    /// Returns the current state as a structured digest.
    ///
    /// The digest can be used to save/restore checksum state, useful for
    /// checkpointing during large file processing.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::RollingChecksum;
    ///
    /// let mut checksum = RollingChecksum::new();
    /// checksum.update(b"some data");
    ///
    /// let digest = checksum.digest();
    /// assert_eq!(digest.value(), checksum.value());
    /// ```
    #[must_use]
    pub const fn digest(&self) -> RollingDigest {
        RollingDigest::new(self.s1 as u16, self.s2 as u16, self.len)
    }

    #[cfg(test)]
    pub(crate) const fn force_state(&mut self, s1: u32, s2: u32, len: usize) {
        self.s1 = s1;
        self.s2 = s2;
        self.len = len;
    }
}

impl_from_owned_and_ref!(RollingChecksum => RollingDigest, digest);

/// Architecture-neutral dispatcher:
/// 1. try arch-accelerated implementation,
/// 2. fall back to scalar.
#[inline]
fn accumulate_chunk_dispatch(s1: u32, s2: u32, len: usize, chunk: &[u8]) -> (u32, u32, usize) {
    if chunk.is_empty() {
        return (s1, s2, len);
    }

    if let Some(accel) = accumulate_chunk_arch(s1, s2, len, chunk) {
        return mask_result(accel);
    }

    mask_result(accumulate_chunk_scalar_raw(s1, s2, len, chunk))
}

/// Arch-specific strategy: returns `Some(...)` if this arch has a fast path,
/// otherwise `None`. This keeps the top-level dispatcher linear and avoids
/// unreachable-code patterns.
#[cfg(target_arch = "aarch64")]
#[inline]
fn accumulate_chunk_arch(s1: u32, s2: u32, len: usize, chunk: &[u8]) -> Option<(u32, u32, usize)> {
    Some(neon::accumulate_chunk(s1, s2, len, chunk))
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[inline]
fn accumulate_chunk_arch(s1: u32, s2: u32, len: usize, chunk: &[u8]) -> Option<(u32, u32, usize)> {
    x86::try_accumulate_chunk(s1, s2, len, chunk)
}

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64", target_arch = "x86")))]
#[inline]
fn accumulate_chunk_arch(
    _s1: u32,
    _s2: u32,
    _len: usize,
    _chunk: &[u8],
) -> Option<(u32, u32, usize)> {
    None
}

#[inline]
const fn mask_result((s1, s2, len): (u32, u32, usize)) -> (u32, u32, usize) {
    (s1 & 0xffff, s2 & 0xffff, len)
}

#[inline]
fn accumulate_chunk_scalar_raw(
    mut s1: u32,
    mut s2: u32,
    len: usize,
    chunk: &[u8],
) -> (u32, u32, usize) {
    if chunk.is_empty() {
        return (s1, s2, len);
    }

    let mut iter = chunk.chunks_exact(4);
    for block in &mut iter {
        s1 = s1.wrapping_add(u32::from(block[0]));
        s2 = s2.wrapping_add(s1);

        s1 = s1.wrapping_add(u32::from(block[1]));
        s2 = s2.wrapping_add(s1);

        s1 = s1.wrapping_add(u32::from(block[2]));
        s2 = s2.wrapping_add(s1);

        s1 = s1.wrapping_add(u32::from(block[3]));
        s2 = s2.wrapping_add(s1);
    }

    for &byte in iter.remainder() {
        s1 = s1.wrapping_add(u32::from(byte));
        s2 = s2.wrapping_add(s1);
    }

    (s1, s2, len.saturating_add(chunk.len()))
}

#[cfg(test)]
pub(crate) fn accumulate_chunk_scalar_for_tests(
    s1: u32,
    s2: u32,
    len: usize,
    chunk: &[u8],
) -> (u32, u32, usize) {
    accumulate_chunk_scalar_raw(s1, s2, len, chunk)
}
