//! Rolling checksum behaviour matching rsync's own `CHAR_OFFSET = 0`
//! convention: s1 is a plain byte sum, s2 is the prefix-sum-of-sums, both
//! truncated to 16 bits.

use checksums::{RollingChecksum, RollingDigest};

fn reference(data: &[u8]) -> (u32, u32) {
    let n = data.len();
    let s1: u32 = data.iter().map(|&b| u32::from(b)).sum();
    let mut s2 = 0u32;
    for (i, &b) in data.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let weight = (n - i) as u32;
        s2 = s2.wrapping_add(weight * u32::from(b));
    }
    (s1 & 0xffff, s2 & 0xffff)
}

#[test]
fn matches_reference_formula_for_several_blocks() {
    for data in [
        b"".as_slice(),
        b"a",
        b"abcd",
        b"the quick brown fox jumps over the lazy dog",
    ] {
        let mut rolling = RollingChecksum::new();
        rolling.update(data);
        let (s1, s2) = reference(data);
        let digest = RollingDigest::from(rolling);
        let mut bytes = Vec::new();
        digest.write_le_to(&mut bytes).unwrap();
        let got_s1 = u16::from_le_bytes([bytes[0], bytes[1]]);
        let got_s2 = u16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(u32::from(got_s1), s1, "s1 mismatch for {data:?}");
        assert_eq!(u32::from(got_s2), s2, "s2 mismatch for {data:?}");
    }
}

#[test]
fn rolling_one_byte_matches_recompute_from_scratch() {
    let window = b"abcdefgh";
    let mut rolling = RollingChecksum::new();
    rolling.update(window);

    rolling.roll(b'a', b'Z').unwrap();

    let mut shifted = window.to_vec();
    shifted.remove(0);
    shifted.push(b'Z');
    let mut recomputed = RollingChecksum::new();
    recomputed.update(&shifted);

    assert_eq!(RollingDigest::from(rolling), RollingDigest::from(recomputed));
}
