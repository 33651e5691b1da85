//! Confirmation bypass token (`spec.md` §4.4, §6.5, §8):
//! `encode_bypass(request_id, passphrase) == "sha256:" + hex(sha256(request_id ";" passphrase))`.

use sha2::{Digest, Sha256};

/// Computes the bypass token a trusted remote presents to skip the
/// interactive confirmation prompt.
#[must_use]
pub fn encode_bypass(request_id: &str, passphrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_id.as_bytes());
    hasher.update(b";");
    hasher.update(passphrase.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Evaluates a session's `pw` field against the host's configured bypass
/// passphrase (`spec.md` §4.4): `None` if no token was offered, `Some(true)`
/// / `Some(false)` if one was and it did or didn't match.
///
/// The comparison runs in constant time with respect to the token's
/// contents — only the (public) lengths are allowed to short-circuit.
#[must_use]
pub fn check_bypass(request_id: &str, offered: &str, configured_passphrase: &str) -> Option<bool> {
    if offered.is_empty() {
        return None;
    }
    if configured_passphrase.is_empty() {
        return Some(false);
    }
    let expected = encode_bypass(request_id, configured_passphrase);
    Some(constant_time_eq(&expected, offered))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_bypass_matches_the_spec_formula() {
        let token = encode_bypass("1", "secret");
        let mut hasher = Sha256::new();
        hasher.update(b"1;secret");
        let digest = hasher.finalize();
        let expected = format!(
            "sha256:{}",
            digest.iter().map(|b| format!("{b:02x}")).collect::<String>()
        );
        assert_eq!(token, expected);
    }

    #[test]
    fn no_token_offered_is_not_applicable() {
        assert_eq!(check_bypass("1", "", "secret"), None);
    }

    #[test]
    fn empty_configured_passphrase_never_matches() {
        let token = encode_bypass("1", "secret");
        assert_eq!(check_bypass("1", &token, ""), Some(false));
    }

    #[test]
    fn matching_token_is_accepted() {
        let token = encode_bypass("1", "secret");
        assert_eq!(check_bypass("1", &token, "secret"), Some(true));
    }

    #[test]
    fn mismatched_token_is_rejected() {
        assert_eq!(check_bypass("1", "sha256:deadbeef", "secret"), Some(false));
    }
}
