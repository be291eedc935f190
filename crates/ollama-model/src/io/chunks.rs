#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The daemon stopped sending the body.
#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    message: String,
    disconnected: bool,
}

impl Error {
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the daemon went away, as opposed to sending garbage.
    #[inline]
    pub fn is_disconnect(&self) -> bool {
        self.disconnected
    }
}

/// The body of a streaming `/api/chat` call.
pub enum Chunks {
    Response {
        response: Response,
        bytes_read: usize,
    },
    #[cfg(test)]
    Scripted(VecDeque<Bytes>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response {
            response,
            bytes_read: 0,
        }
    }

    #[cfg(test)]
    pub fn from_vec_deque(chunks: VecDeque<Bytes>) -> Self {
        Chunks::Scripted(chunks)
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response {
                response,
                bytes_read,
            } => match response.chunk().await {
                Ok(Some(bytes)) => {
                    *bytes_read += bytes.len();
                    Ok(Some(bytes))
                }
                Ok(None) => {
                    trace!("body finished after {bytes_read} bytes");
                    Ok(None)
                }
                Err(err) => {
                    debug!("read failed after {bytes_read} bytes: {err}");
                    Err(Error {
                        disconnected: err.is_connect()
                            || err.is_timeout()
                            || err.is_body(),
                        message: format!("{err}"),
                    })
                }
            },
            #[cfg(test)]
            Chunks::Scripted(chunks) => Ok(chunks.pop_front()),
        }
    }
}
