#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// A failed read of the response body.
#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    message: String,
    transient: bool,
}

impl Error {
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Timeouts and dropped connections are worth another attempt.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self {
            transient: err.is_timeout() || err.is_body() || err.is_request(),
            message: format!("error reading the response body: {err}"),
        }
    }
}

/// The body of a streaming `generateContent` call, chunk by chunk.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    Scripted(VecDeque<Result<Bytes, Error>>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(chunks: VecDeque<Bytes>) -> Self {
        Chunks::Scripted(chunks.into_iter().map(Ok).collect())
    }

    /// Yields the given chunks, then fails as if the connection dropped.
    #[cfg(test)]
    pub fn interrupted_after(chunks: VecDeque<Bytes>) -> Self {
        let mut chunks: VecDeque<_> = chunks.into_iter().map(Ok).collect();
        chunks.push_back(Err(Error {
            message: "connection reset".to_owned(),
            transient: true,
        }));
        Chunks::Scripted(chunks)
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| {
                    debug!("failed to read a chunk: {err}");
                    Error::from(err)
                })
            }
            #[cfg(test)]
            Chunks::Scripted(chunks) => chunks.pop_front().transpose(),
        }
    }
}
