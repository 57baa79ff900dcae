use std::error::Error;

use crate::document::{
    Document, DocumentListQuery, DocumentListResponse, DocumentUpload,
    UploadResponse,
};
use crate::error::ErrorKind;
use crate::query::QueryRequest;
use crate::session::Session;
use crate::stream::FrameStream;

/// The error type for a backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns the HTTP status that caused this error, if any.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// A type that represents the remote API, which is the entry for asking
/// questions and managing documents.
///
/// Once the backend is created, it should behave like a stateless object.
/// Every returned future must be independent of `self`, so callers can
/// drive it from a spawned task.
pub trait Backend: Send + Sync + 'static {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The streamed answer type for this backend.
    type Stream: FrameStream<Error = Self::Error>;

    /// Creates a new server-side conversation.
    fn create_session(
        &self,
        title: Option<&str>,
    ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'static;

    /// Asks a question, returning the answer as a stream of frames.
    ///
    /// The future resolves once the server accepted the request; a
    /// non-success response resolves to an error of kind
    /// [`ErrorKind::RequestFailed`].
    fn stream_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;

    /// Fetches the current state of a document.
    fn get_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'static;

    /// Lists documents.
    fn list_documents(
        &self,
        query: &DocumentListQuery,
    ) -> impl Future<Output = Result<DocumentListResponse, Self::Error>>
    + Send
    + 'static;

    /// Uploads a document and queues it for processing.
    fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static;

    /// Queues an already uploaded document for processing again.
    fn reprocess_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static;

    /// Deletes a document.
    fn delete_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static;
}
