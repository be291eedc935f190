use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading newline-delimited JSON documents from a chunk stream.
///
/// Lines are returned raw, decoding is left to the caller. Blank lines are
/// skipped, and a final line without the trailing newline is still returned.
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
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }
            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => {
                    self.eof = true;
                    // Terminate the last line so it can be taken.
                    if !self.buf.is_empty() {
                        self.buf.push(b'\n');
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, Error> {
        // Splitting on the raw byte keeps multi-byte characters that span
        // two chunks intact.
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            let line =
                String::from_utf8(line).map_err(|_| Error::InvalidPayload)?;
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_owned()));
            }
        }
        Ok(None)
    }
}
