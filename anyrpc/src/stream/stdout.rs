use super::WriteStream;
use crate::error::Result;
use std::io::{self, Write};

/// Writer that forwards directly to the process's stdout, for CLI tools
/// that want to pretty-print a decoded document.
pub struct StdoutWriteStream {
    stdout: io::Stdout,
}

impl StdoutWriteStream {
    pub fn new() -> Self {
        StdoutWriteStream {
            stdout: io::stdout(),
        }
    }
}

impl Default for StdoutWriteStream {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteStream for StdoutWriteStream {
    fn put_byte(&mut self, b: u8) -> Result<()> {
        self.stdout.lock().write_all(&[b])?;
        Ok(())
    }

    fn put_slice(&mut self, s: &[u8]) -> Result<()> {
        self.stdout.lock().write_all(s)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stdout.lock().flush()?;
        Ok(())
    }
}
