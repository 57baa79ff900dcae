//! A scripted in-memory backend for testing purpose.

mod preset;

use std::collections::{BTreeMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use omnidocs_protocol::{
    Backend, BackendError, Document, DocumentListQuery, DocumentListResponse,
    DocumentStatus, DocumentUpload, ErrorKind, Frame, FrameStream,
    QueryRequest, Session, UploadResponse,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Error {
    fn rejected(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::RequestFailed,
            status: Some(status),
        }
    }

    fn unreachable() -> Self {
        Self {
            message: "connection refused".to_owned(),
            kind: ErrorKind::Transport,
            status: None,
        }
    }

    fn not_found() -> Self {
        Self::rejected("Document not found", 404)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

pub struct TestFrameStream {
    frames: VecDeque<Frame>,
    interrupted: bool,
    finished: bool,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FrameStream for TestFrameStream {
    type Error = crate::Error;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Frame>, Self::Error>> {
        let this = self.get_mut();
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        if let Some(frame) = this.frames.pop_front() {
            return Poll::Ready(Ok(Some(frame)));
        }
        this.finished = true;
        if this.interrupted {
            Poll::Ready(Err(Error {
                message: "connection reset by peer".to_owned(),
                kind: ErrorKind::Transport,
                status: None,
            }))
        } else {
            Poll::Ready(Ok(None))
        }
    }
}

struct DocumentEntry {
    document: Document,
    polls: VecDeque<PresetPoll>,
    poll_count: usize,
}

impl DocumentEntry {
    fn new(id: &str, filename: &str) -> Self {
        Self {
            document: Document {
                id: id.to_owned(),
                organization_id: "org-test".to_owned(),
                filename: filename.to_owned(),
                title: None,
                description: None,
                file_path: format!("uploads/{id}/{filename}"),
                file_size: 0,
                mime_type: "application/pdf".to_owned(),
                status: DocumentStatus::Pending,
                chunk_count: 0,
                error_message: None,
                created_at: "2024-01-01T00:00:00Z".to_owned(),
                updated_at: None,
            },
            polls: VecDeque::new(),
            poll_count: 0,
        }
    }

    fn apply(&mut self, poll: &PresetPoll) {
        if let PresetPoll::Status {
            status,
            chunk_count,
            error_message,
        } = poll
        {
            self.document.status = *status;
            self.document.chunk_count = *chunk_count;
            self.document.error_message = error_message.clone();
        }
    }
}

#[derive(Default)]
struct Script {
    session_failures: u64,
    sessions_created: u64,
    turns: VecDeque<PresetTurn>,
    requests: Vec<QueryRequest>,
    documents: BTreeMap<String, DocumentEntry>,
    uploads: u64,
    upload_failure: Option<String>,
}

/// A scripted in-memory backend for testing purpose.
///
/// Before sending queries, you need to setup the turns, which are how the
/// server should answer the queries, in order. If there are no enough
/// turns, the query is rejected.
///
/// Documents answer status polls from their preset poll sequence; once the
/// sequence is exhausted, the last reported state is repeated. Clones share
/// the same script, so a test can keep a handle to inspect what the code
/// under test sent.
#[derive(Clone, Default)]
pub struct TestBackend {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestBackend {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the delay before each streamed frame.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    #[inline]
    pub fn add_turn(&self, turn: PresetTurn) {
        self.script().turns.push_back(turn);
    }

    /// Makes the next `count` session creations fail.
    #[inline]
    pub fn fail_sessions(&self, count: u64) {
        self.script().session_failures = count;
    }

    /// Makes every upload fail with `message`.
    #[inline]
    pub fn fail_uploads(&self, message: &str) {
        self.script().upload_failure = Some(message.to_owned());
    }

    /// Adds a document that answers polls with `polls`.
    pub fn add_document(
        &self,
        id: &str,
        filename: &str,
        polls: impl IntoIterator<Item = PresetPoll>,
    ) {
        let mut entry = DocumentEntry::new(id, filename);
        entry.polls = polls.into_iter().collect();
        self.script().documents.insert(id.to_owned(), entry);
    }

    /// Replaces the remaining poll sequence of a known document.
    pub fn set_polls(
        &self,
        id: &str,
        polls: impl IntoIterator<Item = PresetPoll>,
    ) {
        if let Some(entry) = self.script().documents.get_mut(id) {
            entry.polls = polls.into_iter().collect();
        }
    }

    /// Returns every streamed query received so far.
    #[inline]
    pub fn query_requests(&self) -> Vec<QueryRequest> {
        self.script().requests.clone()
    }

    /// Returns how many sessions were successfully created.
    #[inline]
    pub fn sessions_created(&self) -> u64 {
        self.script().sessions_created
    }

    /// Returns how many times the document was polled.
    #[inline]
    pub fn poll_count(&self, id: &str) -> usize {
        self.script()
            .documents
            .get(id)
            .map_or(0, |entry| entry.poll_count)
    }

    /// Returns whether the document is known.
    #[inline]
    pub fn has_document(&self, id: &str) -> bool {
        self.script().documents.contains_key(id)
    }
}

impl Backend for TestBackend {
    type Error = crate::Error;
    type Stream = TestFrameStream;

    fn create_session(
        &self,
        title: Option<&str>,
    ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        if script.session_failures > 0 {
            script.session_failures -= 1;
            return ready(Err(Error::rejected("Internal Server Error", 500)));
        }
        script.sessions_created += 1;
        ready(Ok(Session {
            id: format!("session-{}", script.sessions_created),
            organization_id: "org-test".to_owned(),
            title: title.map(ToOwned::to_owned),
            created_at: "2024-01-01T00:00:00Z".to_owned(),
            last_activity: "2024-01-01T00:00:00Z".to_owned(),
            message_count: 0,
            messages: None,
        }))
    }

    fn stream_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let result = match script.turns.pop_front() {
            None => Err(Error::rejected("no enough turns", 429)),
            Some(PresetTurn {
                rejection: Some(message),
                ..
            }) => Err(Error::rejected(message, 500)),
            Some(turn) => Ok(TestFrameStream {
                frames: turn.frames.into(),
                interrupted: turn.interrupted,
                finished: false,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }

    fn get_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        let result = match script.documents.get_mut(document_id) {
            None => Err(Error::not_found()),
            Some(entry) => {
                entry.poll_count += 1;
                // The last preset poll sticks.
                let poll = if entry.polls.len() > 1 {
                    entry.polls.pop_front()
                } else {
                    entry.polls.front().cloned()
                };
                match poll {
                    Some(PresetPoll::Unreachable) => Err(Error::unreachable()),
                    Some(poll) => {
                        entry.apply(&poll);
                        Ok(entry.document.clone())
                    }
                    None => Ok(entry.document.clone()),
                }
            }
        };
        ready(result)
    }

    fn list_documents(
        &self,
        query: &DocumentListQuery,
    ) -> impl Future<Output = Result<DocumentListResponse, Self::Error>>
    + Send
    + 'static {
        let script = self.script();
        let matching: Vec<Document> = script
            .documents
            .values()
            .map(|entry| entry.document.clone())
            .filter(|doc| query.status.is_none_or(|status| doc.status == status))
            .collect();
        let total = matching.len() as u64;
        let skip = (query.page.saturating_sub(1) * query.page_size) as usize;
        let documents = matching
            .into_iter()
            .skip(skip)
            .take(query.page_size as usize)
            .collect();
        ready(Ok(DocumentListResponse {
            documents,
            total,
            page: query.page,
            page_size: query.page_size,
        }))
    }

    fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        if let Some(message) = &script.upload_failure {
            return ready(Err(Error::rejected(message.clone(), 400)));
        }
        script.uploads += 1;
        let id = format!("doc-{}", script.uploads);
        let mut entry = DocumentEntry::new(&id, &upload.filename);
        entry.document.title = upload.title;
        entry.document.description = upload.description;
        entry.document.file_size = upload.bytes.len() as u64;
        entry.document.mime_type = upload.content_type;
        // A document scripted ahead of its upload keeps its polls.
        if let Some(existing) = script.documents.remove(&id) {
            entry.polls = existing.polls;
        }
        script.documents.insert(id.clone(), entry);
        ready(Ok(UploadResponse {
            id,
            filename: upload.filename,
            status: DocumentStatus::Pending,
            message: "Document uploaded successfully. Processing started."
                .to_owned(),
        }))
    }

    fn reprocess_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        let result = match script.documents.get_mut(document_id) {
            None => Err(Error::not_found()),
            Some(entry) => {
                entry.document.status = DocumentStatus::Pending;
                entry.document.chunk_count = 0;
                entry.document.error_message = None;
                Ok(UploadResponse {
                    id: entry.document.id.clone(),
                    filename: entry.document.filename.clone(),
                    status: DocumentStatus::Pending,
                    message: "Document queued for reprocessing".to_owned(),
                })
            }
        };
        ready(result)
    }

    fn delete_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let removed = self.script().documents.remove(document_id);
        ready(removed.map(|_| ()).ok_or_else(Error::not_found))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use omnidocs_protocol::StreamEvent;

    use super::*;

    async fn collect_answer(stream: TestFrameStream) -> Result<String, Error> {
        let mut stream = pin!(stream);
        let mut answer = String::new();
        while let Some(frame) =
            poll_fn(|cx| stream.as_mut().poll_next_frame(cx)).await?
        {
            if let Some(StreamEvent::TextDelta(delta)) =
                StreamEvent::from_frame(frame)
            {
                answer.push_str(&delta);
            }
        }
        Ok(answer)
    }

    #[tokio::test]
    async fn test_stream_query() {
        let backend = TestBackend::default();
        backend.add_turn(PresetTurn::answer(["Hello, ", "world!"], Some("s-1")));
        backend.add_turn(PresetTurn::answer(["Bye"], None).interrupted());

        let stream = backend
            .stream_query(&QueryRequest::new("Hi"))
            .await
            .unwrap();
        assert_eq!(collect_answer(stream).await.unwrap(), "Hello, world!");

        let stream = backend
            .stream_query(&QueryRequest::new("Bye").with_session_id("s-1"))
            .await
            .unwrap();
        let err = collect_answer(stream).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = backend
            .stream_query(&QueryRequest::new("More?"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RequestFailed);

        let requests = backend.query_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].session_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_session_failures() {
        let backend = TestBackend::default();
        backend.fail_sessions(1);
        assert!(backend.create_session(None).await.is_err());
        let session = backend.create_session(Some("Q3")).await.unwrap();
        assert_eq!(session.id, "session-1");
        assert_eq!(backend.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_document_polls() {
        let backend = TestBackend::default();
        backend.add_document(
            "doc-9",
            "report.pdf",
            [
                PresetPoll::status(DocumentStatus::Processing),
                PresetPoll::Unreachable,
                PresetPoll::completed(7),
            ],
        );

        let doc = backend.get_document("doc-9").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert!(backend.get_document("doc-9").await.is_err());
        for _ in 0..2 {
            let doc = backend.get_document("doc-9").await.unwrap();
            assert_eq!(doc.status, DocumentStatus::Completed);
            assert_eq!(doc.chunk_count, 7);
        }
        assert_eq!(backend.poll_count("doc-9"), 4);

        backend.delete_document("doc-9").await.unwrap();
        let err = backend.get_document("doc-9").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_upload_and_list() {
        let backend = TestBackend::default();
        let resp = backend
            .upload_document(DocumentUpload::pdf("a.pdf", &b"%PDF-1.7"[..]))
            .await
            .unwrap();
        assert_eq!(resp.id, "doc-1");
        assert_eq!(resp.status, DocumentStatus::Pending);

        let list = backend
            .list_documents(&DocumentListQuery::default())
            .await
            .unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.documents[0].filename, "a.pdf");
        assert_eq!(list.documents[0].file_size, 8);
    }
}
