//! Byte source/sink abstraction shared by every codec reader/writer.
//!
//! Grounded on `examples/original_source/include/anyrpc/stream.h`.
//! Read and write sides are split into two traits because most concrete
//! streams are one-directional (a const string source is never written to;
//! a segmented writer is never read from); `StringStream` is the one type
//! that implements both, for in-situ parsing.

use crate::error::{AnyRpcError, ErrorKind, Result};

mod const_string;
mod file;
mod fixed;
mod segmented;
mod stdout;
mod string_stream;

pub use const_string::ConstStringStream;
pub use file::{FileReadStream, FileStream};
pub use fixed::FixedBufferWriteStream;
pub use segmented::SegmentedWriteStream;
pub use stdout::StdoutWriteStream;
pub use string_stream::StringStream;

/// Read side of the Stream contract (spec.md §4.1).
pub trait ReadStream {
    /// Look at the next byte without consuming it. `None` at end of stream.
    fn peek(&mut self) -> Option<u8>;
    /// Consume and return the next byte.
    fn get(&mut self) -> Option<u8>;
    /// Consume the next byte, zeroing it in the backing buffer if the
    /// stream supports in-situ mutation (used to NUL-terminate strings in
    /// place during in-situ parsing). Streams that don't own a mutable
    /// buffer just behave like `get`.
    fn get_and_clear(&mut self) -> Option<u8> {
        self.get()
    }
    /// Read exactly `n` bytes, returning fewer only at end of stream.
    fn read(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.get() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        out
    }
    fn skip(&mut self, n: usize) {
        for _ in 0..n {
            if self.get().is_none() {
                break;
            }
        }
    }
    fn eof(&self) -> bool;
    fn tell(&self) -> usize;
}

/// Write side of the Stream contract (spec.md §4.1).
pub trait WriteStream {
    fn put_byte(&mut self, b: u8) -> Result<()>;
    fn put_slice(&mut self, s: &[u8]) -> Result<()> {
        for &b in s {
            self.put_byte(b)?;
        }
        Ok(())
    }
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Additional contract for streams that can alias their read cursor with an
/// in-progress write (in-situ parsing). The invariant is that the write
/// cursor must never pass the read cursor.
pub trait InSituWriteStream: WriteStream {
    /// Begin a write region; returns the starting write offset.
    fn put_begin(&mut self) -> usize;
    /// End a write region started at `start`, returning the number of bytes
    /// written. Fails with `BufferOverrun` if the write cursor passed the
    /// read cursor.
    fn put_end(&mut self, start: usize) -> Result<usize>;
}

pub(crate) fn buffer_overrun() -> AnyRpcError {
    AnyRpcError::new(ErrorKind::BufferOverrun, "write cursor passed read cursor")
}
