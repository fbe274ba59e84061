//! LZ4 block compression for bulk tile and preview payloads.
//!
//! Every length field that arrives with a compressed payload is untrusted:
//! the decompressed output is checked against the size the caller expects
//! before it is allowed anywhere near a pixel buffer.

use crate::error::{Error, Result};

pub fn compress(raw: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(raw)
}

/// Expand a block payload to exactly `expected_len` bytes.
pub fn decompress(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let data = lz4_flex::block::decompress(compressed, expected_len)
        .map_err(|e| Error::Decompress(e.to_string()))?;
    if data.len() != expected_len {
        return Err(Error::DecompressedSize {
            expected: expected_len,
            actual: data.len(),
        });
    }
    Ok(data)
}
