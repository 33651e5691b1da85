//! [`LoadSignature`]: the receiving half of a signature exchange. Chunks
//! arrive piecemeal (one `data` command at a time); [`LoadSignature::commit`]
//! parses the accumulated bytes once the sender signals `end_data`.

use crate::block::Signature;
use crate::error::Error;
use crate::wire::decode_signature;

/// Accumulates signature bytes delivered as a sequence of chunks and parses
/// them into a [`Signature`] once the stream is complete.
#[derive(Default)]
pub struct LoadSignature {
    buffer: Vec<u8>,
    signature: Option<Signature>,
}

impl LoadSignature {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk of signature bytes as it arrives off the wire.
    pub fn add_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Parses the bytes accumulated so far into a [`Signature`].
    ///
    /// # Errors
    ///
    /// Returns an error if no bytes were ever added, or if the accumulated
    /// bytes do not form a complete, well-formed signature stream.
    pub fn commit(&mut self) -> Result<(), Error> {
        let signature = decode_signature(&self.buffer)?;
        self.signature = Some(signature);
        Ok(())
    }

    /// The parsed signature, available after a successful [`Self::commit`].
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig_chunks::signature_of_file;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn commit_before_any_chunk_fails() {
        let mut loader = LoadSignature::new();
        assert!(matches!(loader.commit(), Err(Error::EmptySignature)));
    }

    #[test]
    fn loads_signature_delivered_in_arbitrary_chunk_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src");
        let mut f = File::create(&path).unwrap();
        f.write_all(&b"payload-bytes".repeat(200)).unwrap();
        drop(f);

        let all_bytes: Vec<u8> = signature_of_file(&path)
            .unwrap()
            .map(|c| c.unwrap())
            .flatten()
            .collect();

        let mut loader = LoadSignature::new();
        for byte_chunk in all_bytes.chunks(7) {
            loader.add_chunk(byte_chunk);
        }
        loader.commit().unwrap();
        assert!(loader.signature().is_some());
    }
}
