use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use omnidocs_protocol::{
    Backend, BackendError, Document, DocumentListQuery, DocumentListResponse,
    DocumentUpload, Frame, FrameStream, QueryRequest, Session, StreamEvent,
    UploadResponse,
};
use tracing::Instrument;

use crate::error::{Error, ErrorKind};

type BoxError = Box<dyn BackendError>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;
type BoxFrameStream = Pin<Box<dyn DynFrameStream>>;

trait DynFrameStream: Send {
    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Frame>, BoxError>>;
}

impl<S: FrameStream> DynFrameStream for S {
    #[inline]
    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Frame>, BoxError>> {
        FrameStream::poll_next_frame(self, cx).map_err(box_error)
    }
}

trait BackendObject: Send + Sync + 'static {
    fn create_session(&self, title: Option<&str>) -> BoxFuture<Session>;

    fn stream_query(&self, req: &QueryRequest) -> BoxFuture<BoxFrameStream>;

    fn get_document(&self, document_id: &str) -> BoxFuture<Document>;

    fn list_documents(
        &self,
        query: &DocumentListQuery,
    ) -> BoxFuture<DocumentListResponse>;

    fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> BoxFuture<UploadResponse>;

    fn reprocess_document(&self, document_id: &str)
    -> BoxFuture<UploadResponse>;

    fn delete_document(&self, document_id: &str) -> BoxFuture<()>;
}

struct BackendObjectImpl<B: Backend>(B);

#[inline]
fn box_error<E: BackendError>(err: E) -> BoxError {
    Box::new(err)
}

#[inline]
fn erase<T, E, F>(fut: F) -> BoxFuture<T>
where
    T: 'static,
    E: BackendError,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::pin(async move { fut.await.map_err(box_error) })
}

impl<B: Backend> BackendObject for BackendObjectImpl<B> {
    #[inline]
    fn create_session(&self, title: Option<&str>) -> BoxFuture<Session> {
        erase(self.0.create_session(title))
    }

    fn stream_query(&self, req: &QueryRequest) -> BoxFuture<BoxFrameStream> {
        let fut = self.0.stream_query(req);
        Box::pin(async move {
            let stream = fut.await.map_err(box_error)?;
            Ok(Box::pin(stream) as BoxFrameStream)
        })
    }

    #[inline]
    fn get_document(&self, document_id: &str) -> BoxFuture<Document> {
        erase(self.0.get_document(document_id))
    }

    #[inline]
    fn list_documents(
        &self,
        query: &DocumentListQuery,
    ) -> BoxFuture<DocumentListResponse> {
        erase(self.0.list_documents(query))
    }

    #[inline]
    fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> BoxFuture<UploadResponse> {
        erase(self.0.upload_document(upload))
    }

    #[inline]
    fn reprocess_document(
        &self,
        document_id: &str,
    ) -> BoxFuture<UploadResponse> {
        erase(self.0.reprocess_document(document_id))
    }

    #[inline]
    fn delete_document(&self, document_id: &str) -> BoxFuture<()> {
        erase(self.0.delete_document(document_id))
    }
}

/// A wrapper around a backend that provides a type-erased interface for
/// the other modules, and drives streamed answers.
#[derive(Clone)]
pub(crate) struct BackendClient {
    backend: Arc<dyn BackendObject>,
}

/// What a completely received answer amounts to.
#[derive(Clone, Debug, Default)]
pub(crate) struct TurnSummary {
    /// The concatenation of every text delta, in arrival order.
    pub transcript: String,
    /// The session identity announced by the last `done` frame.
    pub session_id: Option<String>,
}

fn convert_error(err: BoxError) -> Error {
    Error::from_backend(&*err)
}

impl BackendClient {
    #[inline]
    pub fn new<B: Backend>(backend: B) -> Self {
        Self {
            backend: Arc::new(BackendObjectImpl(backend)),
        }
    }

    #[inline]
    pub async fn create_session(
        &self,
        title: Option<&str>,
    ) -> Result<Session, Error> {
        self.backend
            .create_session(title)
            .await
            .map_err(convert_error)
    }

    #[inline]
    pub async fn get_document(&self, document_id: &str) -> Result<Document, Error> {
        self.backend
            .get_document(document_id)
            .await
            .map_err(convert_error)
    }

    #[inline]
    pub async fn list_documents(
        &self,
        query: &DocumentListQuery,
    ) -> Result<DocumentListResponse, Error> {
        self.backend
            .list_documents(query)
            .await
            .map_err(convert_error)
    }

    #[inline]
    pub async fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<UploadResponse, Error> {
        self.backend
            .upload_document(upload)
            .await
            .map_err(convert_error)
    }

    #[inline]
    pub async fn reprocess_document(
        &self,
        document_id: &str,
    ) -> Result<UploadResponse, Error> {
        self.backend
            .reprocess_document(document_id)
            .await
            .map_err(convert_error)
    }

    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<(), Error> {
        self.backend
            .delete_document(document_id)
            .await
            .map_err(convert_error)
    }

    /// Asks a question and consumes the streamed answer, calling
    /// `on_event` for every meaningful event in arrival order.
    ///
    /// An `error` event ends the answer with a [`ErrorKind::StreamError`]
    /// and is not passed to `on_event`.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The answer stops streaming further
    /// events when this operation is cancelled.
    pub async fn stream_answer(
        &self,
        req: &QueryRequest,
        on_event: impl FnMut(StreamEvent) + Send,
    ) -> Result<TurnSummary, Error> {
        let fut = self.backend.stream_query(req);
        trace!("sent a query: {req:?}");
        handle_stream(fut, on_event)
            .instrument(trace_span!("backend client query"))
            .await
    }
}

async fn handle_stream(
    fut: BoxFuture<BoxFrameStream>,
    mut on_event: impl FnMut(StreamEvent) + Send,
) -> Result<TurnSummary, Error> {
    let mut stream = match fut.await {
        Ok(stream) => stream,
        Err(err) => {
            error!("failed to open the stream: {err:?}");
            return Err(convert_error(err));
        }
    };

    let mut summary = TurnSummary::default();

    trace!("start receiving frames");

    loop {
        let frame_or_err =
            poll_fn(|cx| stream.as_mut().poll_next_frame(cx)).await;
        let frame = match frame_or_err {
            Ok(frame) => frame,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(convert_error(err));
            }
        };

        let Some(frame) = frame else {
            break;
        };
        trace!("got a frame: {frame:?}");

        let Some(event) = StreamEvent::from_frame(frame) else {
            trace!("ignored a frame with no meaning to this client");
            continue;
        };

        match &event {
            StreamEvent::TextDelta(delta) => summary.transcript.push_str(delta),
            StreamEvent::Sources(_) => {}
            StreamEvent::Completed(session_id) => {
                if let Some(session_id) = session_id {
                    summary.session_id = Some(session_id.clone());
                }
            }
            StreamEvent::Error(message) => {
                return Err(Error::new(ErrorKind::StreamError, message.clone()));
            }
        }
        on_event(event);
    }

    trace!("finished a query");

    Ok(summary)
}
