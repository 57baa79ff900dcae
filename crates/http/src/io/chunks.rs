#[cfg(test)]
use std::collections::VecDeque;
use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

/// The response body stopped before its end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyError(String);

impl Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the response body was interrupted: {}", self.0)
    }
}

/// Byte blocks of a response body, in arrival order.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    Scripted(VecDeque<Result<Bytes, BodyError>>),
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::Scripted(vec.into_iter().map(Ok).collect())
    }

    /// Chunks that end with an interruption instead of end of body.
    #[cfg(test)]
    pub fn interrupted_after(vec: Vec<Bytes>, reason: &str) -> Self {
        let mut scripted: VecDeque<_> = vec.into_iter().map(Ok).collect();
        scripted.push_back(Err(BodyError(reason.to_owned())));
        Chunks::Scripted(scripted)
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, BodyError> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| {
                    debug!("failed to read response body: {err}");
                    BodyError(err.to_string())
                })
            }
            #[cfg(test)]
            Chunks::Scripted(scripted) => scripted.pop_front().transpose(),
        }
    }
}
