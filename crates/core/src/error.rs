use std::error::Error as StdError;
use std::fmt::{self, Display};

use omnidocs_protocol::{BackendError, ErrorKind as BackendErrorKind};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server answered with a non-success status.
    RequestFailed,
    /// The request or the response body could not be transferred.
    Transport,
    /// The server aborted the answer with an `error` frame.
    StreamError,
    /// No session identity could be obtained before the turn.
    SessionAcquisitionFailed,
    /// The server reported that a document could not be processed.
    ProcessingFailed,
    /// Status polling ran out of attempts before the document settled.
    PollTimeout,
    /// Status polling failed too many times in a row.
    PollConnectivityLost,
    /// The file was rejected before uploading.
    InvalidUpload,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RequestFailed => write!(f, "Request failed"),
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::StreamError => write!(f, "Stream error"),
            ErrorKind::SessionAcquisitionFailed => {
                write!(f, "Session acquisition failed")
            }
            ErrorKind::ProcessingFailed => write!(f, "Processing failed"),
            ErrorKind::PollTimeout => write!(f, "Poll timeout"),
            ErrorKind::PollConnectivityLost => {
                write!(f, "Poll connectivity lost")
            }
            ErrorKind::InvalidUpload => write!(f, "Invalid upload"),
        }
    }
}

/// An error ending a turn, a tracking loop or a document operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates an error of the given kind.
    #[inline]
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn from_backend(err: &dyn BackendError) -> Self {
        let kind = match err.kind() {
            BackendErrorKind::Transport => ErrorKind::Transport,
            BackendErrorKind::RequestFailed
            | BackendErrorKind::InvalidResponse => ErrorKind::RequestFailed,
        };
        Self::new(kind, err.to_string())
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl StdError for Error {}
