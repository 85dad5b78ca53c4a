//! Fixed-size partitioning and reassembly
//!
//! Chunks are zero-copy slices of the input `Bytes`.

use crate::common::{Error, Result};
use bytes::{Bytes, BytesMut};

/// Split `data` into consecutive chunks of `chunk_size` bytes; the last chunk
/// may be shorter. Empty input yields no chunks.
pub fn partition(data: &Bytes, chunk_size: usize) -> Result<Vec<Bytes>> {
    if chunk_size == 0 {
        return Err(Error::InvalidArgument("chunk_size must be > 0".into()));
    }

    let mut chunks = Vec::with_capacity(data.len().div_ceil(chunk_size));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    Ok(chunks)
}

/// Concatenate chunks in the given order.
pub fn reassemble<I>(chunks: I, size_hint: usize) -> Bytes
where
    I: IntoIterator<Item = Bytes>,
{
    let mut out = BytesMut::with_capacity(size_hint);
    for chunk in chunks {
        out.extend_from_slice(&chunk);
    }
    out.freeze()
}
