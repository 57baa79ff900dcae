use std::pin::Pin;
use std::task::{Context, Poll, ready};

use omnidocs_protocol::{ErrorKind, Frame, FrameStream};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::FrameReader;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFrame = Result<(Option<Frame>, FrameReader), Error>;

pin_project! {
    /// A streamed answer read from an HTTP response body.
    pub struct HttpFrameStream {
        next_frame_fut: Option<PinnedFuture<NextFrame>>,
    }
}

impl HttpFrameStream {
    #[inline]
    pub(crate) fn from_reader(reader: FrameReader) -> Self {
        Self {
            next_frame_fut: Some(Box::pin(next_frame(reader))),
        }
    }
}

impl FrameStream for HttpFrameStream {
    type Error = Error;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Frame>, Self::Error>> {
        let this = self.project();
        let Some(next_frame_fut) = this.next_frame_fut else {
            return Poll::Ready(Ok(None));
        };
        let (frame, reader) = match ready!(next_frame_fut.as_mut().poll(cx)) {
            Ok((Some(frame), reader)) => (frame, reader),
            Ok((None, _)) => {
                *this.next_frame_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_frame_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The body may still have more data to pull, create a new future
        // for the next frame.
        *this.next_frame_fut = Some(Box::pin(next_frame(reader)));

        Poll::Ready(Ok(Some(frame)))
    }
}

async fn next_frame(mut reader: FrameReader) -> NextFrame {
    let frame = reader
        .next_frame()
        .await
        .map_err(|err| Error::new(err.to_string(), ErrorKind::Transport))?;
    if let Some(frame) = &frame {
        trace!("got frame: {frame:?}");
    }
    Ok((frame, reader))
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use omnidocs_protocol::{BackendError, StreamEvent};

    use super::*;
    use crate::io::Chunks;

    #[tokio::test]
    async fn test_stream_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    b"data: {\"type\":\"sources\",\"content\":[{\"document_id\":\"d1\",\"document_title\":\"Guide\",\"chunk_id\":\"c1\",\"content\":\"...\",\"relevance_score\":0.9}]}\n",
                ),
                Bytes::from_static(b"data: {\"type\":\"text\",\"content\":\"Hel\"}\ndata: {\"ty"),
                Bytes::from_static(b"pe\":\"text\",\"content\":\"lo\"}\ndata: {\"type\":\"done\"}\n"),
            ]
            .into(),
        );
        let mut stream = pin!(HttpFrameStream::from_reader(FrameReader::new(chunks)));

        let mut events = Vec::new();
        while let Some(frame) = poll_fn(|cx| stream.as_mut().poll_next_frame(cx))
            .await
            .unwrap()
        {
            events.extend(StreamEvent::from_frame(frame));
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], StreamEvent::Sources(s) if s[0].document_id == "d1"));
        assert_eq!(events[1], StreamEvent::TextDelta("Hel".to_owned()));
        assert_eq!(events[2], StreamEvent::TextDelta("lo".to_owned()));
        assert_eq!(events[3], StreamEvent::Completed(None));

        // Exhausted streams keep reporting the end.
        let frame = poll_fn(|cx| stream.as_mut().poll_next_frame(cx)).await;
        assert_eq!(frame.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interrupted_body() {
        let chunks = Chunks::interrupted_after(
            vec![Bytes::from_static(b"data: {\"type\":\"text\",\"content\":\"Par\"}\n")],
            "connection reset",
        );
        let mut stream = pin!(HttpFrameStream::from_reader(FrameReader::new(chunks)));

        let frame = poll_fn(|cx| stream.as_mut().poll_next_frame(cx)).await;
        assert_eq!(frame.unwrap(), Some(Frame::text("Par")));

        let err = poll_fn(|cx| stream.as_mut().poll_next_frame(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.to_string(),
            "the response body was interrupted: connection reset"
        );

        let frame = poll_fn(|cx| stream.as_mut().poll_next_frame(cx)).await;
        assert_eq!(frame.unwrap(), None);
    }
}
