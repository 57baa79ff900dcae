use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use omnidocs_protocol::{
    Backend, BackendError, Document, DocumentListQuery, DocumentListResponse,
    DocumentUpload, ErrorKind, Frame, FrameStream, QueryRequest, Session,
    StreamEvent, UploadResponse,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeBackendError(ErrorKind);

impl Display for FakeBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeBackendError {}

impl BackendError for FakeBackendError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct FakeFrameStream {
    frames: VecDeque<Frame>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeFrameStream {
    fn echo(question: &str) -> Self {
        let mut frames: VecDeque<Frame> = format!("You asked {question}")
            .split_inclusive(' ')
            .map(Frame::text)
            .collect();
        frames.push_back(Frame::done(Some("echo-session".to_owned())));
        Self {
            frames,
            sleep: None,
        }
    }
}

impl FrameStream for FakeFrameStream {
    type Error = FakeBackendError;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<Frame>, Self::Error>> {
        let this = self.get_mut();
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(Duration::from_millis(1))));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(Ok(this.frames.pop_front()))
    }
}

struct FakeBackend;

impl Backend for FakeBackend {
    type Error = FakeBackendError;
    type Stream = FakeFrameStream;

    fn create_session(
        &self,
        _title: Option<&str>,
    ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'static
    {
        ready(Err(FakeBackendError(ErrorKind::RequestFailed)))
    }

    fn stream_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let result = if req.query.is_empty() {
            Err(FakeBackendError(ErrorKind::RequestFailed))
        } else {
            Ok(FakeFrameStream::echo(&req.query))
        };
        ready(result)
    }

    fn get_document(
        &self,
        _document_id: &str,
    ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'static
    {
        ready(Err(FakeBackendError(ErrorKind::Transport)))
    }

    fn list_documents(
        &self,
        _query: &DocumentListQuery,
    ) -> impl Future<Output = Result<DocumentListResponse, Self::Error>>
    + Send
    + 'static {
        ready(Err(FakeBackendError(ErrorKind::Transport)))
    }

    fn upload_document(
        &self,
        _upload: DocumentUpload,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static
    {
        ready(Err(FakeBackendError(ErrorKind::Transport)))
    }

    fn reprocess_document(
        &self,
        _document_id: &str,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static
    {
        ready(Err(FakeBackendError(ErrorKind::Transport)))
    }

    fn delete_document(
        &self,
        _document_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        ready(Err(FakeBackendError(ErrorKind::Transport)))
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    #[tokio::test]
    async fn test_streamed_answer() {
        let backend = FakeBackend;
        let req = QueryRequest::new("about refunds");
        let mut stream = backend.stream_query(&req).await.unwrap();

        let mut answer = String::new();
        let mut session_id = None;
        loop {
            let frame =
                poll_fn(|cx| Pin::new(&mut stream).poll_next_frame(cx)).await;
            let Some(frame) = frame.unwrap() else {
                break;
            };
            match StreamEvent::from_frame(frame) {
                Some(StreamEvent::TextDelta(delta)) => answer.push_str(&delta),
                Some(StreamEvent::Completed(id)) => session_id = id,
                other => unreachable!("unexpected event: {other:?}"),
            }
        }

        assert_eq!(answer, "You asked about refunds");
        assert_eq!(session_id.as_deref(), Some("echo-session"));
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let backend = FakeBackend;
        let result = backend.stream_query(&QueryRequest::new("")).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestFailed);
        assert_eq!(err.status(), None);
    }
}
