#[cfg(test)]
use std::collections::VecDeque;
use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

/// The body stream broke before it ended.
#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    received: usize,
    message: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "response body broke after {} bytes: {}",
            self.received, self.message
        )
    }
}

enum Source {
    Http(Response),
    #[cfg(test)]
    Preset(VecDeque<Bytes>),
}

/// Pulls the body of a streaming response one chunk at a time.
pub struct Chunks {
    source: Source,
    received: usize,
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Self {
            source: Source::Http(response),
            received: 0,
        }
    }

    #[cfg(test)]
    pub fn from_vec_deque(chunks: VecDeque<Bytes>) -> Self {
        Self {
            source: Source::Preset(chunks),
            received: 0,
        }
    }

    /// Returns the next chunk, `None` once the body is complete.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        let chunk = match &mut self.source {
            Source::Http(response) => {
                response.chunk().await.map_err(|err| Error {
                    received: self.received,
                    message: format!("{err}"),
                })?
            }
            #[cfg(test)]
            Source::Preset(chunks) => chunks.pop_front(),
        };
        if let Some(bytes) = &chunk {
            self.received += bytes.len();
        }
        Ok(chunk)
    }
}
