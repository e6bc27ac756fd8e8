use super::WriteStream;
use crate::error::{AnyRpcError, ErrorKind, Result};

/// Writer over a caller-supplied fixed-capacity buffer. Errors with
/// `BufferOverrun` rather than growing past capacity.
pub struct FixedBufferWriteStream<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> FixedBufferWriteStream<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        FixedBufferWriteStream { buf, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<'a> WriteStream for FixedBufferWriteStream<'a> {
    fn put_byte(&mut self, b: u8) -> Result<()> {
        if self.len == self.buf.len() {
            return Err(AnyRpcError::new(
                ErrorKind::BufferOverrun,
                "fixed buffer write stream is full",
            ));
        }
        self.buf[self.len] = b;
        self.len += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_past_capacity() {
        let mut backing = [0u8; 2];
        let mut s = FixedBufferWriteStream::new(&mut backing);
        s.put_byte(1).unwrap();
        s.put_byte(2).unwrap();
        assert!(s.put_byte(3).is_err());
    }
}
