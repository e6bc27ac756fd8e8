use super::WriteStream;
use crate::error::Result;

const INITIAL_CHUNK_CAP: usize = 256;
const DEFAULT_MAX_CHUNK_CAP: usize = 64 * 1024;

/// A single growable chunk. One extra byte of capacity is always reserved
/// beyond `data`'s logical content so a trailing NUL can be written by
/// `get_buffer` callers without truncating the real payload (spec.md §4.1:
/// "required by consumers that treat the returned slice as a C string for
/// logging").
struct Chunk {
    data: Vec<u8>,
    cap: usize,
}

impl Chunk {
    fn new(cap: usize) -> Self {
        Chunk {
            data: Vec::with_capacity(cap),
            cap,
        }
    }

    fn free(&self) -> usize {
        self.cap - self.data.len()
    }
}

/// Segmented output buffer: starts with a small fixed buffer and allocates
/// new chunks that double in capacity (up to `max_chunk_cap`) as each fills
/// up. Exposed to the socket layer as an iterator of contiguous slices via
/// `get_buffer`, avoiding a realloc-copy while streaming (spec.md §4.1,
/// §9 Design Notes "Segmented output buffer").
pub struct SegmentedWriteStream {
    chunks: Vec<Chunk>,
    max_chunk_cap: usize,
    len: usize,
}

impl SegmentedWriteStream {
    pub fn new() -> Self {
        Self::with_max_chunk_cap(DEFAULT_MAX_CHUNK_CAP)
    }

    pub fn with_max_chunk_cap(max_chunk_cap: usize) -> Self {
        SegmentedWriteStream {
            chunks: vec![Chunk::new(INITIAL_CHUNK_CAP)],
            max_chunk_cap,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return a contiguous slice starting at `offset` (into the logical,
    /// concatenated byte stream) and the length of that contiguous run.
    /// Callers iterate by re-calling with `offset + returned_length` until
    /// they have consumed `len()` bytes total.
    pub fn get_buffer(&self, offset: usize) -> &[u8] {
        if offset >= self.len {
            return &[];
        }
        let mut remaining = offset;
        for chunk in &self.chunks {
            if remaining < chunk.data.len() {
                return &chunk.data[remaining..];
            }
            remaining -= chunk.data.len();
        }
        &[]
    }

    /// Materialize the whole segmented buffer into one owned `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.data);
        }
        out
    }

    fn push_chunk(&mut self) {
        let last_cap = self.chunks.last().map(|c| c.cap).unwrap_or(INITIAL_CHUNK_CAP);
        let next_cap = (last_cap * 2).min(self.max_chunk_cap).max(INITIAL_CHUNK_CAP);
        self.chunks.push(Chunk::new(next_cap));
    }
}

impl Default for SegmentedWriteStream {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteStream for SegmentedWriteStream {
    fn put_byte(&mut self, b: u8) -> Result<()> {
        if self.chunks.last().unwrap().free() == 0 {
            self.push_chunk();
        }
        self.chunks.last_mut().unwrap().data.push(b);
        self.len += 1;
        Ok(())
    }

    fn put_slice(&mut self, s: &[u8]) -> Result<()> {
        let mut remaining = s;
        while !remaining.is_empty() {
            let chunk = self.chunks.last_mut().unwrap();
            let free = chunk.free();
            if free == 0 {
                self.push_chunk();
                continue;
            }
            let take = free.min(remaining.len());
            self.chunks.last_mut().unwrap().data.extend_from_slice(&remaining[..take]);
            self.len += take;
            remaining = &remaining[take..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_across_chunks_and_doubles_capacity() {
        let mut s = SegmentedWriteStream::with_max_chunk_cap(8);
        let data = vec![7u8; 40];
        s.put_slice(&data).unwrap();
        assert_eq!(s.len(), 40);
        assert_eq!(s.to_vec(), data);
    }

    #[test]
    fn get_buffer_walks_chunks() {
        let mut s = SegmentedWriteStream::with_max_chunk_cap(4);
        s.put_slice(b"hello world").unwrap();
        let mut offset = 0;
        let mut collected = Vec::new();
        while offset < s.len() {
            let chunk = s.get_buffer(offset);
            assert!(!chunk.is_empty());
            collected.extend_from_slice(chunk);
            offset += chunk.len();
        }
        assert_eq!(collected, b"hello world");
    }
}
