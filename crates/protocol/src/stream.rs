use std::pin::Pin;
use std::task::{self, Poll};

use crate::backend::BackendError;
use crate::frame::Frame;

/// A streamed answer from the backend.
pub trait FrameStream: Sized + Send + 'static {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// Attempts to pull out the next frame from the stream.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct stream state:
    ///
    /// - `Poll::Pending` means that the next frame is not available yet.
    ///   Implementations will ensure that the current task will be
    ///   notified when more data arrives.
    /// - `Poll::Ready(Ok(Some(frame)))` means a frame was decoded, and
    ///   more may follow on subsequent calls.
    /// - `Poll::Ready(Ok(None))` means the response body has ended.
    /// - `Poll::Ready(Err(error))` means the transfer failed.
    ///
    /// Frames are yielded in the order they arrived. Calling this method
    /// after completion should always return `None`.
    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<Frame>, Self::Error>>;
}
