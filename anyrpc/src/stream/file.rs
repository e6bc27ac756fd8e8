use super::{ReadStream, WriteStream};
use crate::error::Result;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

/// Buffered file source for a reader.
pub struct FileReadStream {
    reader: BufReader<File>,
    pos: usize,
    lookahead: Option<u8>,
    eof: bool,
}

impl FileReadStream {
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(FileReadStream {
            reader: BufReader::new(File::open(path)?),
            pos: 0,
            lookahead: None,
            eof: false,
        })
    }

    fn fill(&mut self) {
        if self.lookahead.is_none() && !self.eof {
            let mut byte = [0u8; 1];
            match self.reader.read(&mut byte) {
                Ok(0) | Err(_) => self.eof = true,
                Ok(_) => self.lookahead = Some(byte[0]),
            }
        }
    }
}

impl ReadStream for FileReadStream {
    fn peek(&mut self) -> Option<u8> {
        self.fill();
        self.lookahead
    }

    fn get(&mut self) -> Option<u8> {
        self.fill();
        let b = self.lookahead.take()?;
        self.pos += 1;
        Some(b)
    }

    fn eof(&self) -> bool {
        self.eof && self.lookahead.is_none()
    }

    fn tell(&self) -> usize {
        self.pos
    }
}

/// Buffered file sink for a writer.
pub struct FileStream {
    writer: BufWriter<File>,
}

impl FileStream {
    pub fn create(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(FileStream {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl WriteStream for FileStream {
    fn put_byte(&mut self, b: u8) -> Result<()> {
        self.writer.write_all(&[b])?;
        Ok(())
    }

    fn put_slice(&mut self, s: &[u8]) -> Result<()> {
        self.writer.write_all(s)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
