//! RFC 1321 test vectors and streaming behaviour for the strong digest.

use checksums::strong::{Md5, StrongDigest};

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(&mut out, "{byte:02x}").expect("write! to String cannot fail");
    }
    out
}

#[test]
fn rfc1321_test_vectors() {
    let cases: &[(&[u8], &str)] = &[
        (b"", "d41d8cd98f00b204e9800998ecf8427e"),
        (b"a", "0cc175b9c0f1b6a831c399e269772661"),
        (b"abc", "900150983cd24fb0d6963f7d28e17f72"),
        (b"message digest", "f96b697d7cb7938d525a2f31aaf161d0"),
        (
            b"abcdefghijklmnopqrstuvwxyz",
            "c3fcd3d76192e4007dfb496cca67e13b",
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(to_hex(&Md5::digest(input)), *expected, "input = {input:?}");
    }
}

#[test]
fn streaming_matches_one_shot() {
    let data = vec![0x5a_u8; 10_000];
    let one_shot = Md5::digest(&data);

    let mut hasher = Md5::new();
    for chunk in data.chunks(777) {
        hasher.update(chunk);
    }
    assert_eq!(hasher.finalize(), one_shot);
}

#[test]
fn empty_update_is_a_no_op() {
    let mut hasher = Md5::new();
    hasher.update(b"");
    hasher.update(b"abc");
    hasher.update(b"");
    assert_eq!(hasher.finalize(), Md5::digest(b"abc"));
}
