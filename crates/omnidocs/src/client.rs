use std::path::Path;
use std::sync::Arc;

use omnidocs_core::{
    ChatSession, ChatSessionBuilder, DocumentRecord, DocumentTracker,
    DocumentTrackerBuilder, Error, ErrorKind, Notification, PollPolicy,
    TurnOutcome,
};
use omnidocs_http::{ApiConfig, HttpBackend};
use omnidocs_protocol::{Backend, DocumentStatus, DocumentUpload, Source};

/// A client builder.
///
/// See [`Client`].
pub struct ClientBuilder<B> {
    backend: B,
    chat_builder: ChatSessionBuilder,
    tracker_builder: DocumentTrackerBuilder,
    on_notification: Option<NotificationCallback>,
}

type NotificationCallback = Arc<dyn Fn(Notification) + Send + Sync>;

impl ClientBuilder<HttpBackend> {
    /// Creates a client builder talking to the remote API.
    #[inline]
    pub fn with_config(config: ApiConfig) -> Self {
        Self::with_backend(HttpBackend::new(config))
    }
}

impl<B: Backend + Clone> ClientBuilder<B> {
    /// Creates a client builder with a specified backend.
    pub fn with_backend(backend: B) -> Self {
        Self {
            chat_builder: ChatSessionBuilder::with_backend(backend.clone()),
            tracker_builder: DocumentTrackerBuilder::with_backend(backend.clone()),
            backend,
            on_notification: None,
        }
    }

    /// Sets how many excerpts are retrieved per question.
    #[inline]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.chat_builder = self.chat_builder.with_top_k(top_k);
        self
    }

    /// Sets the limits of document status polling.
    #[inline]
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.tracker_builder = self.tracker_builder.with_poll_policy(policy);
        self
    }

    /// Attaches a callback to be invoked with every fragment of an answer.
    #[inline]
    pub fn on_text_delta(
        mut self,
        on_text_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.chat_builder = self.chat_builder.on_text_delta(on_text_delta);
        self
    }

    /// Attaches a callback to be invoked when an answer cites sources.
    #[inline]
    pub fn on_sources(
        mut self,
        on_sources: impl Fn(&[Source]) + Send + Sync + 'static,
    ) -> Self {
        self.chat_builder = self.chat_builder.on_sources(on_sources);
        self
    }

    /// Attaches a callback to be invoked with notifications from both the
    /// chat and the document tracking.
    pub fn on_notification(
        mut self,
        on_notification: impl Fn(Notification) + Send + Sync + 'static,
    ) -> Self {
        let on_notification: NotificationCallback = Arc::new(on_notification);
        self.chat_builder = self.chat_builder.on_notification({
            let on_notification = Arc::clone(&on_notification);
            move |notification| on_notification(notification)
        });
        self.tracker_builder = self.tracker_builder.on_notification({
            let on_notification = Arc::clone(&on_notification);
            move |notification| on_notification(notification)
        });
        self.on_notification = Some(on_notification);
        self
    }

    /// Builds a new client.
    pub fn build(self) -> Client<B> {
        Client {
            backend: self.backend,
            chat: self.chat_builder.build(),
            documents: self.tracker_builder.build(),
            on_notification: self.on_notification,
        }
    }
}

/// A client that holds a chat and the document tracking, sharing one backend.
///
/// Background work (streaming answers, polling document status) runs on the
/// tokio runtime the client is used from.
pub struct Client<B> {
    backend: B,
    chat: ChatSession,
    documents: DocumentTracker,
    on_notification: Option<NotificationCallback>,
}

impl<B: Backend + Clone> Client<B> {
    /// Returns the chat.
    #[inline]
    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    /// Returns the document tracking.
    #[inline]
    pub fn documents(&self) -> &DocumentTracker {
        &self.documents
    }

    /// Returns the backend, for the endpoints that neither the chat nor
    /// the tracking cover.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Asks a question in the current conversation.
    #[inline]
    pub async fn ask<S: Into<String>>(&self, question: S) -> TurnOutcome {
        self.chat.send_message(question).await
    }

    /// Scopes the following questions to the given documents.
    ///
    /// Only processed documents can be selected; the others are skipped.
    /// Returns the identities actually selected. An empty selection
    /// searches every processed document.
    pub fn select_documents<I, S>(&self, document_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = self.documents.registry();
        let selected: Vec<String> = document_ids
            .into_iter()
            .map(Into::into)
            .filter(|id| {
                let ready = registry
                    .get(id)
                    .is_some_and(|record| record.status == DocumentStatus::Completed);
                if !ready {
                    warn!("skipped {id}, which is not ready to be asked about");
                }
                ready
            })
            .collect();
        self.chat.select_documents(selected.iter().cloned());
        selected
    }

    /// Reads a file and uploads it. Tracking starts in the background.
    pub async fn upload_file(
        &self,
        path: &Path,
        title: Option<String>,
    ) -> Result<DocumentRecord, Error> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("failed to read {}: {err}", path.display());
                let message = format!("Failed to read {}", path.display());
                if let Some(on_notification) = &self.on_notification {
                    on_notification(Notification::error(&message));
                }
                return Err(Error::new(ErrorKind::InvalidUpload, message));
            }
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_owned());
        let upload = DocumentUpload {
            content_type: content_type_of(path).to_string(),
            filename,
            bytes: bytes.into(),
            title,
            description: None,
        };
        let (record, _) = self.documents.upload(upload).await?;
        Ok(record)
    }
}

fn content_type_of(path: &Path) -> mime::Mime {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => mime::APPLICATION_PDF,
        Some("txt") => mime::TEXT_PLAIN,
        Some("md") => "text/markdown".parse().unwrap_or(mime::TEXT_PLAIN),
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM)
        }
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
