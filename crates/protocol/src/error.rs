use std::fmt::{self, Display};

/// The kind of error a backend reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server answered with a non-success status.
    RequestFailed,
    /// The request or the response body could not be transferred.
    Transport,
    /// The server answered successfully, but the body was not understood.
    InvalidResponse,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RequestFailed => write!(f, "Request failed"),
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::InvalidResponse => write!(f, "Invalid response"),
        }
    }
}
