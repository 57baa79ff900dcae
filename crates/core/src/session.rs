mod builder;
#[cfg(test)]
mod tests;
mod turn;

use std::sync::Arc;

use omnidocs_protocol::Source;
use tokio::sync::watch;

use crate::backend_client::BackendClient;
use crate::conversation::{Conversation, Role};
use crate::error::Error;
use crate::notification::Notifier;
pub use builder::ChatSessionBuilder;

/// Where the current (or the last) turn is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TurnStage {
    /// No turn has been sent yet.
    #[default]
    Idle,
    /// Obtaining a session identity before the first turn.
    AwaitingSession,
    /// The answer is being streamed.
    Streaming,
    /// The last turn completed.
    Settled,
    /// The last turn failed and was rolled back.
    Failed,
}

impl TurnStage {
    /// Whether a turn is in flight.
    #[inline]
    pub fn is_in_flight(self) -> bool {
        matches!(self, TurnStage::AwaitingSession | TurnStage::Streaming)
    }
}

/// The result of [`ChatSession::send_message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The answer was received completely.
    Settled,
    /// The turn failed. The question stays in the transcript, the
    /// unfinished answer doesn't.
    Failed(Error),
    /// Another turn is in flight, so nothing happened.
    Busy,
}

struct Inner {
    client: BackendClient,
    state: watch::Sender<Conversation>,
    stage: watch::Sender<TurnStage>,
    top_k: u32,
    include_sources: bool,
    on_text_delta: Option<Box<dyn Fn(&str) + Send + Sync>>,
    on_sources: Option<Box<dyn Fn(&[Source]) + Send + Sync>>,
    notifier: Notifier,
}

/// A chat with the document assistant, which maintains a conversation and
/// drives question/answer turns against a backend.
///
/// At most one turn is in flight at a time: calling
/// [`send_message`](Self::send_message) while a turn is running returns
/// [`TurnOutcome::Busy`] without touching anything. The handle is cheap to
/// clone; clones share the conversation.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    fn from_builder(builder: ChatSessionBuilder) -> Self {
        let ChatSessionBuilder {
            client,
            top_k,
            include_sources,
            on_text_delta,
            on_sources,
            notifier,
        } = builder;

        let inner = Inner {
            client,
            state: watch::channel(Conversation::default()).0,
            stage: watch::channel(TurnStage::default()).0,
            top_k,
            include_sources,
            on_text_delta,
            on_sources,
            notifier,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Asks a question and waits until the answer settles or the turn
    /// fails.
    ///
    /// The question is appended to the transcript before anything else
    /// happens. Failures are also reported through the notification
    /// callback.
    pub async fn send_message<S: Into<String>>(&self, question: S) -> TurnOutcome {
        let question = question.into();
        let accepted = self.inner.state.send_if_modified(|conversation| {
            if conversation.is_streaming() {
                return false;
            }
            conversation.set_streaming(true);
            conversation.add_message(Role::User, question.as_str(), false);
            true
        });
        if !accepted {
            debug!("a turn is in flight, ignoring the question");
            return TurnOutcome::Busy;
        }
        self.run_turn(question).await
    }

    /// Scopes the following questions to the given documents. An empty
    /// selection searches every processed document.
    pub fn select_documents<I, S>(&self, document_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let document_ids = document_ids.into_iter().map(Into::into).collect();
        self.inner
            .state
            .send_modify(|conversation| conversation.select_documents(document_ids));
    }

    /// Begins a brand-new conversation. The next question acquires a new
    /// session.
    ///
    /// Returns `false` and does nothing while a turn is in flight.
    pub fn new_conversation(&self) -> bool {
        self.modify_when_idle(Conversation::reset)
    }

    /// Clears the transcript and the sources, staying in the same session.
    ///
    /// Returns `false` and does nothing while a turn is in flight.
    pub fn clear(&self) -> bool {
        self.modify_when_idle(Conversation::clear)
    }

    /// Continues an existing server-side session. The transcript is cleared,
    /// since earlier messages are not fetched.
    ///
    /// Returns `false` and does nothing while a turn is in flight.
    pub fn resume<S: Into<String>>(&self, session_id: S) -> bool {
        let session_id = session_id.into();
        self.modify_when_idle(move |conversation| {
            conversation.reset();
            conversation.set_session_id(session_id);
        })
    }

    /// Returns a snapshot of the conversation.
    #[inline]
    pub fn conversation(&self) -> Conversation {
        self.inner.state.borrow().clone()
    }

    /// Returns a receiver that observes every change to the conversation.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.inner.state.subscribe()
    }

    /// Returns the stage of the current (or the last) turn.
    #[inline]
    pub fn stage(&self) -> TurnStage {
        *self.inner.stage.borrow()
    }

    fn modify_when_idle(&self, f: impl FnOnce(&mut Conversation)) -> bool {
        let mut f = Some(f);
        let modified = self.inner.state.send_if_modified(|conversation| {
            if conversation.is_streaming() {
                return false;
            }
            if let Some(f) = f.take() {
                f(conversation);
            }
            true
        });
        if modified {
            self.inner.stage.send_replace(TurnStage::Idle);
        } else {
            debug!("a turn is in flight, keeping the conversation");
        }
        modified
    }
}
