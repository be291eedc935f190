use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Multiple `data` lines in one event are
/// joined with a line feed, comments and other fields are skipped.
pub struct Sse {
    buf: String,
    // Bytes of an incomplete UTF-8 sequence split across chunks.
    pending_bytes: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending_bytes: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // An event may already be buffered from the previous chunk.
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // Flush a trailing event without the blank line.
                if !self.buf.trim().is_empty() {
                    self.buf.push_str("\n\n");
                    return Ok(self.try_parse_event());
                }
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending_bytes.extend_from_slice(bytes);
        let valid_up_to = match str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.pending_bytes.split_off(valid_up_to);
        let mut text = String::from_utf8(std::mem::replace(
            &mut self.pending_bytes,
            rest,
        ))
        .map_err(|_| Error::InvalidPayload)?;
        // A CR at the end may be the first half of a CRLF.
        if text.ends_with('\r') {
            text.pop();
            self.pending_bytes.insert(0, b'\r');
        }
        // Normalize `end-of-line` so that only line feeds remain.
        self.buf.push_str(&text.replace("\r\n", "\n").replace('\r', "\n"));
        Ok(())
    }

    fn try_parse_event(&mut self) -> Option<String> {
        loop {
            // event         = *( comment / field ) end-of-line
            // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
            let eol_idx = self.buf.find("\n\n")?;
            let block: String = self.buf.drain(0..eol_idx + 2).collect();

            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                if name != "data" {
                    continue;
                }
                let value = value.strip_prefix(' ').unwrap_or(value);
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }

            // Blocks without data (keep-alives, comments) are skipped.
            if data.is_some() {
                return data;
            }
        }
    }
}
