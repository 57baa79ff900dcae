use omnidocs_protocol::{DocumentStatus, Frame};
use serde::{Deserialize, Serialize};

/// The preset answer for one streamed query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetTurn {
    /// Frames in the response body, in order.
    pub frames: Vec<Frame>,
    /// If set, the request is rejected with this message and no body is
    /// streamed.
    #[serde(default)]
    pub rejection: Option<String>,
    /// Whether the body breaks off with a transport error after the
    /// frames instead of ending cleanly.
    #[serde(default)]
    pub interrupted: bool,
}

impl PresetTurn {
    /// Creates a `PresetTurn` with the specified frames.
    #[inline]
    pub fn with_frames(frames: impl Into<Vec<Frame>>) -> Self {
        Self {
            frames: frames.into(),
            rejection: None,
            interrupted: false,
        }
    }

    /// Creates a well-formed answer: one `text` frame per fragment, then a
    /// `done` frame carrying `session_id`.
    pub fn answer<'a>(
        fragments: impl IntoIterator<Item = &'a str>,
        session_id: Option<&str>,
    ) -> Self {
        let mut frames: Vec<Frame> =
            fragments.into_iter().map(Frame::text).collect();
        frames.push(Frame::done(session_id.map(ToOwned::to_owned)));
        Self::with_frames(frames)
    }

    /// Creates a turn whose request is rejected by the server.
    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            frames: vec![],
            rejection: Some(message.into()),
            interrupted: false,
        }
    }

    /// Makes the body break off after the frames.
    #[inline]
    pub fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }
}

/// The preset result of one document status poll.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetPoll {
    #[serde(rename = "status")]
    Status {
        status: DocumentStatus,
        chunk_count: u32,
        error_message: Option<String>,
    },
    /// The poll fails with a transport error.
    #[serde(rename = "unreachable")]
    Unreachable,
}

impl PresetPoll {
    /// A poll reporting a non-terminal status.
    #[inline]
    pub fn status(status: DocumentStatus) -> Self {
        PresetPoll::Status {
            status,
            chunk_count: 0,
            error_message: None,
        }
    }

    /// A poll reporting a processed document.
    #[inline]
    pub fn completed(chunk_count: u32) -> Self {
        PresetPoll::Status {
            status: DocumentStatus::Completed,
            chunk_count,
            error_message: None,
        }
    }

    /// A poll reporting a failed document.
    #[inline]
    pub fn failed(error_message: Option<&str>) -> Self {
        PresetPoll::Status {
            status: DocumentStatus::Failed,
            chunk_count: 0,
            error_message: error_message.map(ToOwned::to_owned),
        }
    }
}
