use omnidocs_protocol::{Backend, DEFAULT_TOP_K, Source};

use super::ChatSession;
use crate::backend_client::BackendClient;
use crate::notification::{Notification, Notifier};

/// [`ChatSession`] builder.
pub struct ChatSessionBuilder {
    pub(crate) client: BackendClient,
    pub(crate) top_k: u32,
    pub(crate) include_sources: bool,
    pub(crate) on_text_delta: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_sources: Option<Box<dyn Fn(&[Source]) + Send + Sync>>,
    pub(crate) notifier: Notifier,
}

impl ChatSessionBuilder {
    /// Creates a new builder with the specified backend.
    #[inline]
    pub fn with_backend<B: Backend>(backend: B) -> Self {
        Self {
            client: BackendClient::new(backend),
            top_k: DEFAULT_TOP_K,
            include_sources: true,
            on_text_delta: None,
            on_sources: None,
            notifier: Notifier::default(),
        }
    }

    /// Sets how many excerpts are retrieved per question.
    #[inline]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets whether answers should cite their sources.
    #[inline]
    pub fn with_include_sources(mut self, include_sources: bool) -> Self {
        self.include_sources = include_sources;
        self
    }

    /// Attaches a callback to be invoked with every fragment of an answer.
    #[inline]
    pub fn on_text_delta(
        mut self,
        on_text_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_text_delta = Some(Box::new(on_text_delta));
        self
    }

    /// Attaches a callback to be invoked when a non-empty source list
    /// arrives.
    #[inline]
    pub fn on_sources(
        mut self,
        on_sources: impl Fn(&[Source]) + Send + Sync + 'static,
    ) -> Self {
        self.on_sources = Some(Box::new(on_sources));
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

    /// Builds the session.
    #[inline]
    pub fn build(self) -> ChatSession {
        ChatSession::from_builder(self)
    }
}
