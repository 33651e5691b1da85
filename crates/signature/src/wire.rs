//! Byte layout shared by [`crate::signature_of_file`]/[`crate::LoadSignature`]
//! (the signature stream) and [`crate::delta_for_file`]/[`crate::PatchFile`]
//! (the delta op stream). Both are opaque to the wire protocol proper — they
//! only ever travel inside a command's `data` field — so the layout is a
//! private implementation detail of this crate, not a public format.

use crate::block::{Signature, SignatureBlock};
use crate::error::Error;

pub(crate) const HEADER_LEN: usize = 12;
pub(crate) const BLOCK_RECORD_LEN: usize = 20;

pub(crate) fn encode_header(block_size: usize, file_len: u64) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    #[allow(clippy::cast_possible_truncation)]
    out[0..4].copy_from_slice(&(block_size as u32).to_le_bytes());
    out[4..12].copy_from_slice(&file_len.to_le_bytes());
    out
}

pub(crate) fn decode_header(bytes: &[u8]) -> Result<(usize, u64), Error> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::TruncatedSignature {
            expected: HEADER_LEN,
            got: bytes.len(),
        });
    }
    let block_size = u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes")) as usize;
    let file_len = u64::from_le_bytes(bytes[4..12].try_into().expect("8 bytes"));
    Ok((block_size, file_len))
}

pub(crate) fn encode_block(block: &SignatureBlock) -> [u8; BLOCK_RECORD_LEN] {
    let mut out = [0u8; BLOCK_RECORD_LEN];
    out[0..4].copy_from_slice(&block.weak.to_le_bytes());
    out[4..20].copy_from_slice(&block.strong);
    out
}

pub(crate) fn decode_block(bytes: &[u8]) -> Result<SignatureBlock, Error> {
    if bytes.len() < BLOCK_RECORD_LEN {
        return Err(Error::TruncatedSignature {
            expected: BLOCK_RECORD_LEN,
            got: bytes.len(),
        });
    }
    let weak = u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes"));
    let mut strong = [0u8; 16];
    strong.copy_from_slice(&bytes[4..20]);
    Ok(SignatureBlock { weak, strong })
}

/// Parses a complete signature byte stream (header followed by one record
/// per block) into a [`Signature`].
pub(crate) fn decode_signature(bytes: &[u8]) -> Result<Signature, Error> {
    if bytes.is_empty() {
        return Err(Error::EmptySignature);
    }
    let (block_size, file_len) = decode_header(bytes)?;
    let mut blocks = Vec::new();
    let mut offset = HEADER_LEN;
    while offset < bytes.len() {
        let remaining = &bytes[offset..];
        if remaining.len() < BLOCK_RECORD_LEN {
            return Err(Error::TruncatedSignature {
                expected: BLOCK_RECORD_LEN,
                got: remaining.len(),
            });
        }
        blocks.push(decode_block(remaining)?);
        offset += BLOCK_RECORD_LEN;
    }
    Ok(Signature {
        block_size,
        file_len,
        blocks,
    })
}

/// Delta op tags, one per wire chunk from [`crate::delta_for_file`].
pub(crate) const OP_COPY: u8 = 0x00;
pub(crate) const OP_DATA: u8 = 0x01;

pub(crate) fn encode_copy_op(block_index: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    out.push(OP_COPY);
    out.extend_from_slice(&block_index.to_le_bytes());
    out
}

pub(crate) fn encode_data_op(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + data.len());
    out.push(OP_DATA);
    out.extend_from_slice(data);
    out
}

/// A single parsed delta op.
pub(crate) enum DeltaOp<'a> {
    Copy(u32),
    Data(&'a [u8]),
}

pub(crate) fn decode_delta_op(chunk: &[u8]) -> Result<DeltaOp<'_>, Error> {
    let (&tag, rest) = chunk.split_first().ok_or(Error::TruncatedSignature {
        expected: 1,
        got: 0,
    })?;
    match tag {
        OP_COPY => {
            if rest.len() < 4 {
                return Err(Error::TruncatedSignature {
                    expected: 4,
                    got: rest.len(),
                });
            }
            let index = u32::from_le_bytes(rest[0..4].try_into().expect("4 bytes"));
            Ok(DeltaOp::Copy(index))
        }
        OP_DATA => Ok(DeltaOp::Data(rest)),
        other => Err(Error::UnknownDeltaOp(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let encoded = encode_header(4096, 1_000_000);
        let (block_size, file_len) = decode_header(&encoded).unwrap();
        assert_eq!(block_size, 4096);
        assert_eq!(file_len, 1_000_000);
    }

    #[test]
    fn block_round_trips() {
        let block = SignatureBlock {
            weak: 0xdead_beef,
            strong: [7u8; 16],
        };
        let encoded = encode_block(&block);
        let decoded = decode_block(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn decode_signature_rejects_truncated_trailing_record() {
        let mut bytes = encode_header(100, 50).to_vec();
        bytes.extend_from_slice(&[0u8; 5]);
        let err = decode_signature(&bytes).unwrap_err();
        assert!(matches!(err, Error::TruncatedSignature { .. }));
    }

    #[test]
    fn copy_and_data_ops_round_trip() {
        let copy = encode_copy_op(42);
        match decode_delta_op(&copy).unwrap() {
            DeltaOp::Copy(index) => assert_eq!(index, 42),
            DeltaOp::Data(_) => panic!("expected copy op"),
        }

        let data = encode_data_op(b"literal bytes");
        match decode_delta_op(&data).unwrap() {
            DeltaOp::Data(bytes) => assert_eq!(bytes, b"literal bytes"),
            DeltaOp::Copy(_) => panic!("expected data op"),
        }
    }

    #[test]
    fn decode_delta_op_rejects_unknown_tag() {
        let err = decode_delta_op(&[0xff, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::UnknownDeltaOp(0xff)));
    }
}
