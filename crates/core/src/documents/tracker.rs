use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use omnidocs_protocol::{Backend, Document, DocumentListQuery, DocumentUpload};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use tracing::Instrument;

use super::registry::{DocumentRecord, DocumentRegistry};
use super::schedule::{PollEnd, PollPolicy, PollSchedule, PollStep};
use crate::backend_client::BackendClient;
use crate::error::{Error, ErrorKind};
use crate::notification::{Notification, Notifier};

/// Largest file accepted for upload, in bytes.
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Resolves to the settled record once tracking of a document ends.
pub type TrackHandle = JoinHandle<Result<DocumentRecord, Error>>;

struct RunningLoop {
    generation: u64,
    abort_handle: AbortHandle,
}

struct Inner {
    client: BackendClient,
    registry: watch::Sender<DocumentRegistry>,
    policy: PollPolicy,
    notifier: Notifier,
    loops: Mutex<HashMap<String, RunningLoop>>,
    next_generation: AtomicU64,
}

/// Uploads documents and follows their processing.
///
/// Every tracked document gets its own polling loop, running on the tokio
/// runtime until the document settles or the [`PollPolicy`] gives up.
/// Loops only ever touch their own document's record. The handle is cheap
/// to clone; clones share the registry and the loops.
#[derive(Clone)]
pub struct DocumentTracker {
    inner: Arc<Inner>,
}

impl DocumentTracker {
    fn loops(&self) -> MutexGuard<'_, HashMap<String, RunningLoop>> {
        self.inner.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uploads a document and starts tracking it.
    ///
    /// Empty files and files larger than [`MAX_UPLOAD_SIZE`] are rejected
    /// without contacting the server.
    pub async fn upload(
        &self,
        upload: DocumentUpload,
    ) -> Result<(DocumentRecord, TrackHandle), Error> {
        if let Err(err) = validate_upload(&upload) {
            self.inner.notifier.notify(Notification::error(err.message()));
            return Err(err);
        }

        let title = upload.title.clone();
        let resp = match self.inner.client.upload_document(upload).await {
            Ok(resp) => resp,
            Err(err) => {
                error!("upload failed: {err:?}");
                self.notify_failure(&err, "Failed to upload document");
                return Err(err);
            }
        };

        let record = DocumentRecord::from_upload(resp, title);
        self.inner
            .registry
            .send_modify(|registry| registry.insert(record.clone()));
        self.inner
            .notifier
            .notify(Notification::success("Document uploaded! Processing started."));

        let handle = self.track(&record.id);
        Ok((record, handle))
    }

    /// Starts tracking a document, replacing any loop already tracking it.
    ///
    /// Must be called within a tokio runtime.
    pub fn track(&self, document_id: &str) -> TrackHandle {
        let id = document_id.to_owned();

        // Keep the lock until the loop is registered, so it can't
        // deregister itself first.
        let mut loops = self.loops();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let this = self.clone();
        let span = debug_span!("track document", document_id = %id);
        let handle = tokio::spawn(
            {
                let id = id.clone();
                async move {
                    let result = this.poll_until_settled(&id).await;
                    this.deregister(&id, generation);
                    result
                }
            }
            .instrument(span),
        );

        let running = RunningLoop {
            generation,
            abort_handle: handle.abort_handle(),
        };
        if let Some(previous) = loops.insert(id, running) {
            debug!("replacing a running loop of {document_id}");
            previous.abort_handle.abort();
        }
        handle
    }

    /// Queues a document for processing again, then tracks it from
    /// `pending`.
    pub async fn reprocess(&self, document_id: &str) -> Result<TrackHandle, Error> {
        if let Err(err) = self.inner.client.reprocess_document(document_id).await {
            error!("reprocess failed: {err:?}");
            self.notify_failure(&err, "Failed to reprocess document");
            return Err(err);
        }

        self.stop_tracking(document_id);
        self.inner
            .registry
            .send_if_modified(|registry| registry.reset_to_pending(document_id));
        self.inner
            .notifier
            .notify(Notification::success("Document queued for reprocessing"));
        Ok(self.track(document_id))
    }

    /// Deletes a document, stopping any loop tracking it.
    pub async fn delete(&self, document_id: &str) -> Result<(), Error> {
        if let Err(err) = self.inner.client.delete_document(document_id).await {
            error!("delete failed: {err:?}");
            self.inner
                .notifier
                .notify(Notification::error("Failed to delete document"));
            return Err(err);
        }

        self.stop_tracking(document_id);
        self.inner
            .registry
            .send_if_modified(|registry| registry.remove(document_id).is_some());
        self.inner
            .notifier
            .notify(Notification::success("Document deleted"));
        Ok(())
    }

    /// Replaces the registry with the server's document list.
    pub async fn refresh(&self) -> Result<(), Error> {
        let query = DocumentListQuery {
            page_size: 100,
            ..Default::default()
        };
        let resp = match self.inner.client.list_documents(&query).await {
            Ok(resp) => resp,
            Err(err) => {
                error!("failed to list documents: {err:?}");
                self.inner
                    .notifier
                    .notify(Notification::error("Failed to load documents"));
                return Err(err);
            }
        };

        let records = resp.documents.into_iter().map(Into::into).collect();
        self.inner
            .registry
            .send_modify(|registry| registry.replace_all(records));
        Ok(())
    }

    /// Returns a snapshot of the registry.
    #[inline]
    pub fn registry(&self) -> DocumentRegistry {
        self.inner.registry.borrow().clone()
    }

    /// Returns a receiver that observes every change to the registry.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<DocumentRegistry> {
        self.inner.registry.subscribe()
    }

    /// Whether a loop is tracking the document.
    #[inline]
    pub fn is_tracking(&self, document_id: &str) -> bool {
        self.loops().contains_key(document_id)
    }

    fn stop_tracking(&self, document_id: &str) {
        if let Some(running) = self.loops().remove(document_id) {
            debug!("stopped tracking {document_id}");
            running.abort_handle.abort();
        }
    }

    fn deregister(&self, document_id: &str, generation: u64) {
        let mut loops = self.loops();
        if loops
            .get(document_id)
            .is_some_and(|running| running.generation == generation)
        {
            loops.remove(document_id);
        }
    }

    fn notify_failure(&self, err: &Error, fallback: &str) {
        let message = if err.message().is_empty() {
            fallback
        } else {
            err.message()
        };
        self.inner.notifier.notify(Notification::error(message));
    }
}

impl DocumentTracker {
    async fn poll_until_settled(
        &self,
        document_id: &str,
    ) -> Result<DocumentRecord, Error> {
        let mut schedule = PollSchedule::new(self.inner.policy);
        let mut delay = schedule.initial_delay();

        loop {
            sleep(delay).await;

            let step = match self.inner.client.get_document(document_id).await {
                Ok(doc) => {
                    trace!("polled: {} ({} chunks)", doc.status, doc.chunk_count);
                    let status = doc.status;
                    self.merge(doc);
                    schedule.on_status(status)
                }
                Err(err) => {
                    warn!("status poll failed: {err}");
                    schedule.on_error()
                }
            };

            match step {
                PollStep::Wait(next) => delay = next,
                PollStep::Finish(end) => {
                    debug!("stopped after {} polls: {end:?}", schedule.attempts());
                    return self.finish(document_id, end);
                }
            }
        }
    }

    fn merge(&self, doc: Document) {
        self.inner.registry.send_if_modified(|registry| {
            if registry.get(&doc.id).is_none() {
                registry.insert(doc.into());
                return true;
            }
            registry.merge_status(
                &doc.id,
                doc.status,
                doc.chunk_count,
                doc.error_message,
            )
        });
    }

    fn finish(&self, document_id: &str, end: PollEnd) -> Result<DocumentRecord, Error> {
        let record = self.inner.registry.borrow().get(document_id).cloned();
        let name = record
            .as_ref()
            .map_or(document_id, |record| record.display_name())
            .to_owned();

        match (end, record) {
            (PollEnd::Completed, Some(record)) => {
                self.inner
                    .notifier
                    .notify(Notification::success(format!("\"{name}\" is ready!")));
                Ok(record)
            }
            (PollEnd::Failed, record) => {
                let message = record
                    .and_then(|record| record.error_message)
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_owned());
                self.inner.notifier.notify(Notification::error(format!(
                    "\"{name}\" processing failed: {message}"
                )));
                Err(Error::new(ErrorKind::ProcessingFailed, message))
            }
            (PollEnd::TimedOut, _) => {
                let message = format!(
                    "\"{name}\" is still processing. Check back later."
                );
                self.inner.notifier.notify(Notification::info(message.as_str()));
                Err(Error::new(ErrorKind::PollTimeout, message))
            }
            (PollEnd::ConnectivityLost, _) => {
                let message = format!(
                    "Lost connection while checking \"{name}\". Refresh to see its status."
                );
                self.inner
                    .notifier
                    .notify(Notification::error(message.as_str()));
                Err(Error::new(ErrorKind::PollConnectivityLost, message))
            }
            (PollEnd::Completed, None) => {
                // The record was removed while polling.
                Err(Error::new(
                    ErrorKind::RequestFailed,
                    format!("\"{name}\" is no longer listed"),
                ))
            }
        }
    }
}

fn validate_upload(upload: &DocumentUpload) -> Result<(), Error> {
    if upload.bytes.is_empty() {
        return Err(Error::new(ErrorKind::InvalidUpload, "File is empty"));
    }
    if upload.bytes.len() > MAX_UPLOAD_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidUpload,
            "File is too large. Maximum size is 50 MB.",
        ));
    }
    Ok(())
}

/// [`DocumentTracker`] builder.
pub struct DocumentTrackerBuilder {
    client: BackendClient,
    policy: PollPolicy,
    notifier: Notifier,
}

impl DocumentTrackerBuilder {
    /// Creates a new builder with the specified backend.
    #[inline]
    pub fn with_backend<B: Backend>(backend: B) -> Self {
        Self {
            client: BackendClient::new(backend),
            policy: PollPolicy::default(),
            notifier: Notifier::default(),
        }
    }

    /// Sets the limits of every polling loop.
    #[inline]
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attaches a callback to be invoked with user-facing notifications.
    #[inline]
    pub fn on_notification(
        mut self,
        on_notification: impl Fn(Notification) + Send + Sync + 'static,
    ) -> Self {
        self.notifier = Notifier::new(on_notification);
        self
    }

    /// Builds the tracker.
    #[inline]
    pub fn build(self) -> DocumentTracker {
        let Self {
            client,
            policy,
            notifier,
        } = self;
        let inner = Inner {
            client,
            registry: watch::channel(DocumentRegistry::default()).0,
            policy,
            notifier,
            loops: Mutex::default(),
            next_generation: AtomicU64::new(1),
        };
        DocumentTracker {
            inner: Arc::new(inner),
        }
    }
}
