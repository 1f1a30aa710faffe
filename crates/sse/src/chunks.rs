use std::collections::VecDeque;
use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

/// The error returned when the underlying body cannot be read.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to read the response body")
    }
}

impl std::error::Error for Error {}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    /// Chunks read from an HTTP response body.
    Response(Response),
    /// Chunks prepared in memory, mostly used by tests.
    VecDeque(VecDeque<Bytes>),
}

impl Chunks {
    /// Creates chunks from an HTTP response.
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    /// Creates chunks from the given in-memory buffers.
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::VecDeque(vec)
    }

    /// Reads the next chunk, `None` means the body has ended.
    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => match response.chunk().await {
                Ok(chunk) => Ok(chunk),
                Err(err) => {
                    debug!("failed to read chunk: {err}");
                    Err(Error)
                }
            },
            Chunks::VecDeque(vec) => Ok(vec.pop_front()),
        }
    }
}
