use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Source;

/// Fallback message for an `error` frame that carries no text.
pub const DEFAULT_STREAM_ERROR: &str = "Query failed";

/// The declared kind of a [`Frame`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// A fragment of the answer text.
    Text,
    /// The cited sources of the answer.
    Sources,
    /// The answer is complete.
    Done,
    /// The server gave up on the answer.
    Error,
    /// A kind this client doesn't know about.
    #[default]
    #[serde(other)]
    Unknown,
}

/// The content carried by a [`Frame`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FramePayload {
    /// A plain string, as carried by `text` and `error` frames.
    Text(String),
    /// A list of sources, as carried by `sources` frames.
    Sources(Vec<Source>),
    /// Anything else.
    Other(Value),
}

/// A single decoded unit of the streaming protocol, corresponding to one
/// `data:` line of the response body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// What this frame announces.
    #[serde(rename = "type", default)]
    pub kind: FrameKind,
    /// The frame content, if any.
    #[serde(rename = "content", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<FramePayload>,
    /// The server-side session identity. Only `done` frames carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Frame {
    /// Creates a `text` frame.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: Some(FramePayload::Text(text.into())),
            session_id: None,
        }
    }

    /// Creates a `sources` frame.
    #[inline]
    pub fn sources(sources: Vec<Source>) -> Self {
        Self {
            kind: FrameKind::Sources,
            payload: Some(FramePayload::Sources(sources)),
            session_id: None,
        }
    }

    /// Creates a `done` frame, optionally announcing a session identity.
    #[inline]
    pub fn done(session_id: Option<String>) -> Self {
        Self {
            kind: FrameKind::Done,
            payload: None,
            session_id,
        }
    }

    /// Creates an `error` frame.
    #[inline]
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FrameKind::Error,
            payload: Some(FramePayload::Text(message.into())),
            session_id: None,
        }
    }
}

/// The meaning of a frame, as far as a conversation is concerned.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Text to append to the answer.
    TextDelta(String),
    /// The full source list of the answer, replacing any previous one.
    Sources(Vec<Source>),
    /// The answer is complete. The server may announce (or rotate) the
    /// session identity here.
    Completed(Option<String>),
    /// The turn failed on the server side.
    Error(String),
}

impl StreamEvent {
    /// Classifies a frame.
    ///
    /// Returns `None` for frames that have no meaning to this client: unknown
    /// kinds, or known kinds with a payload of the wrong shape. Those frames
    /// are skipped rather than treated as errors, so the server can add new
    /// kinds without breaking older clients.
    pub fn from_frame(frame: Frame) -> Option<Self> {
        let Frame {
            kind,
            payload,
            session_id,
        } = frame;
        match (kind, payload) {
            (FrameKind::Text, Some(FramePayload::Text(text))) => {
                Some(StreamEvent::TextDelta(text))
            }
            (FrameKind::Sources, Some(FramePayload::Sources(sources))) => {
                Some(StreamEvent::Sources(sources))
            }
            (FrameKind::Done, _) => Some(StreamEvent::Completed(session_id)),
            (FrameKind::Error, Some(FramePayload::Text(message))) => {
                Some(StreamEvent::Error(message))
            }
            (FrameKind::Error, _) => {
                Some(StreamEvent::Error(DEFAULT_STREAM_ERROR.to_owned()))
            }
            _ => None,
        }
    }
}
