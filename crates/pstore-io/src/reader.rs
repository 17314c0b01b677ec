// Path: crates/pstore-io/src/reader.rs

//! A buffered reader driven by a caller-supplied refiller, the only point
//! that touches the underlying socket (§4.G). The HTTP request parser and
//! the WebSocket frame reader both sit on top of this.

use pstore_types::{Error, Result};

/// Reads more bytes into `dest`, returning how many were read (`0` at EOF).
/// The sole place a [`BufferedReader`] ever touches the underlying
/// descriptor.
pub trait Refiller {
    fn refill(&mut self, dest: &mut [u8]) -> Result<usize>;
}

impl<F: FnMut(&mut [u8]) -> Result<usize>> Refiller for F {
    fn refill(&mut self, dest: &mut [u8]) -> Result<usize> {
        self(dest)
    }
}

const CHUNK_SIZE: usize = 4096;
/// Longest line `gets()` will accumulate before giving up (§4.H "the reader
/// caps stored header sizes and fails with `string_too_long` on excess").
const MAX_LINE_LEN: usize = 8192;

pub struct BufferedReader<R: Refiller> {
    refiller: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Refiller> BufferedReader<R> {
    #[must_use]
    pub fn new(refiller: R) -> Self {
        BufferedReader { refiller, buf: Vec::new(), pos: 0, eof: false }
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }

    fn fill_more(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let start = self.buf.len();
        self.buf.resize(start + CHUNK_SIZE, 0);
        let n = self.refiller.refill(&mut self.buf[start..])?;
        self.buf.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    /// Reads and consumes one `\r\n`-terminated line, excluding the
    /// terminator. Errors with `string_too_long` past [`MAX_LINE_LEN`], and
    /// with `insufficient_data` if the peer hangs up mid-line.
    pub fn gets(&mut self) -> Result<String> {
        loop {
            if let Some(rel) = find_crlf(&self.buf[self.pos..]) {
                let line = String::from_utf8_lossy(&self.buf[self.pos..self.pos + rel]).into_owned();
                self.pos += rel + 2;
                self.compact();
                return Ok(line);
            }
            if self.available() > MAX_LINE_LEN {
                return Err(Error::StringTooLong);
            }
            if !self.fill_more()? {
                return Err(Error::InsufficientData);
            }
        }
    }

    /// Reads exactly `len` bytes, or fails with `insufficient_data` if the
    /// peer hangs up first.
    pub fn get_span(&mut self, len: usize) -> Result<Vec<u8>> {
        while self.available() < len {
            if !self.fill_more()? {
                return Err(Error::InsufficientData);
            }
        }
        let out = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        self.compact();
        Ok(out)
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
