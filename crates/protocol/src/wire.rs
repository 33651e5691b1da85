//! Low-level wire helpers: control-code sanitisation, `;;` escaping, and the
//! `key=value;key=value` tokenizer (`spec.md` §4.1).

/// Strips ASCII C0 control characters from `s`, retaining tab and newline.
///
/// Applied at serialize time only — deserialized values are taken as-is
/// (`spec.md` §9, Open Question: sanitize at serialize-out, preserve as-is
/// on ingest).
#[must_use]
pub fn sanitize_control_codes(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\t' || c == '\n' || (c as u32) >= 0x20)
        .collect()
}

/// Doubles every literal `;` so it survives the `key=value;…` join.
#[must_use]
pub fn escape_semicolons(s: &str) -> String {
    if !s.contains(';') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        out.push(c);
        if c == ';' {
            out.push(';');
        }
    }
    out
}

/// One `key=value` pair recovered from the wire, with `;;` already
/// collapsed back to a literal `;` inside the value.
pub(crate) struct RawPair {
    pub key: String,
    pub value: String,
}

/// Splits a serialized command body into `key=value` pairs.
///
/// A single `;` is a pair separator; `;;` denotes one literal `;` inside the
/// preceding token. This is a single left-to-right pass, matching
/// `spec.md` §4.1 exactly: unescaping happens before the `=` split, so a
/// literal `;` can appear on either side (in practice only field values
/// ever contain one).
pub(crate) fn split_pairs(data: &str) -> Vec<RawPair> {
    let mut pairs = Vec::new();
    let mut token = String::new();
    let mut chars = data.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ';' {
            if chars.peek() == Some(&';') {
                chars.next();
                token.push(';');
                continue;
            }
            push_token(&mut pairs, &token);
            token.clear();
        } else {
            token.push(c);
        }
    }
    push_token(&mut pairs, &token);

    pairs
}

fn push_token(pairs: &mut Vec<RawPair>, token: &str) {
    if token.is_empty() {
        return;
    }
    if let Some(eq) = token.find('=') {
        pairs.push(RawPair {
            key: token[..eq].to_string(),
            value: token[eq + 1..].to_string(),
        });
    }
}
