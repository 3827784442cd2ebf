use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => err.fmt(f),
            Error::InvalidPayload => f.write_str("stream line is not UTF-8"),
        }
    }
}

/// Reads newline-delimited JSON documents from a chunk stream.
///
/// Only the line framing is handled here, decoding each document is left
/// to the caller.
pub struct JsonLines {
    buf: Vec<u8>,
    chunks: Chunks,
    eof: bool,
}

impl JsonLines {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            eof: false,
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(line) = self.try_take_line()? {
                return Ok(Some(line));
            }
            if self.eof {
                // The server may omit the trailing newline.
                return self.take_rest();
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn try_take_line(&mut self) -> Result<Option<String>, Error> {
        while let Some(eol_idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=eol_idx).collect();
            let line = str::from_utf8(&line)
                .map_err(|_| Error::InvalidPayload)?
                .trim();
            if !line.is_empty() {
                return Ok(Some(line.to_owned()));
            }
        }
        Ok(None)
    }

    fn take_rest(&mut self) -> Result<Option<String>, Error> {
        let rest = std::mem::take(&mut self.buf);
        let rest = String::from_utf8(rest).map_err(|_| Error::InvalidPayload)?;
        let rest = rest.trim();
        if rest.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rest.to_owned()))
        }
    }
}
