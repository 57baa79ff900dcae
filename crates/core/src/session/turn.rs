use omnidocs_protocol::{QueryRequest, StreamEvent};
use tracing::Instrument;

use super::{ChatSession, TurnOutcome, TurnStage};
use crate::backend_client::TurnSummary;
use crate::conversation::Role;
use crate::error::{Error, ErrorKind};
use crate::notification::Notification;

impl ChatSession {
    /// Runs a turn whose question is already in the transcript.
    ///
    /// Dropping the returned future before it completes rolls the turn back
    /// the same way a failure does, minus the notification.
    pub(super) async fn run_turn(&self, question: String) -> TurnOutcome {
        let mut guard = TurnGuard {
            session: self,
            placeholder_added: false,
            finished: false,
        };
        let result = self
            .stream_turn(question, &mut guard.placeholder_added)
            .instrument(trace_span!("turn"))
            .await;
        guard.finished = true;
        match result {
            Ok(summary) => {
                self.settle(summary);
                TurnOutcome::Settled
            }
            Err(err) => {
                self.fail(&err, guard.placeholder_added);
                TurnOutcome::Failed(err)
            }
        }
    }

    async fn stream_turn(
        &self,
        question: String,
        placeholder_added: &mut bool,
    ) -> Result<TurnSummary, Error> {
        let session_id = self.ensure_session().await?;

        let request = {
            let conversation = self.inner.state.borrow();
            let mut request = QueryRequest::new(question)
                .with_session_id(session_id)
                .with_document_ids(conversation.selected_documents().iter().cloned());
            request.top_k = self.inner.top_k;
            request.include_sources = self.inner.include_sources;
            request
        };

        self.inner.stage.send_replace(TurnStage::Streaming);
        self.inner.state.send_modify(|conversation| {
            conversation.add_message(Role::Assistant, "", true);
        });
        *placeholder_added = true;

        self.inner
            .client
            .stream_answer(&request, |event| self.apply_event(event))
            .await
    }

    async fn ensure_session(&self) -> Result<String, Error> {
        let session_id = self
            .inner
            .state
            .borrow()
            .session_id()
            .map(ToOwned::to_owned);
        if let Some(session_id) = session_id {
            return Ok(session_id);
        }

        self.inner.stage.send_replace(TurnStage::AwaitingSession);
        match self.inner.client.create_session(None).await {
            Ok(session) => {
                debug!("acquired session {}", session.id);
                self.inner.state.send_modify(|conversation| {
                    conversation.set_session_id(session.id.as_str());
                });
                Ok(session.id)
            }
            Err(err) => {
                error!("failed to create a session: {err:?}");
                Err(Error::new(
                    ErrorKind::SessionAcquisitionFailed,
                    "Failed to create session",
                ))
            }
        }
    }

    fn apply_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta(delta) => {
                self.inner
                    .state
                    .send_modify(|conversation| conversation.append_to_last(&delta));
                if let Some(on_text_delta) = &self.inner.on_text_delta {
                    on_text_delta(&delta);
                }
            }
            StreamEvent::Sources(sources) => {
                let announced = match &self.inner.on_sources {
                    Some(_) if !sources.is_empty() => Some(sources.clone()),
                    _ => None,
                };
                self.inner.state.send_modify(|conversation| {
                    conversation.set_sources(sources);
                });
                if let (Some(on_sources), Some(sources)) =
                    (&self.inner.on_sources, announced)
                {
                    on_sources(&sources);
                }
            }
            StreamEvent::Completed(Some(session_id)) => {
                self.inner.state.send_if_modified(|conversation| {
                    if conversation.session_id() == Some(session_id.as_str()) {
                        return false;
                    }
                    debug!("session identity is now {session_id}");
                    conversation.set_session_id(session_id);
                    true
                });
            }
            StreamEvent::Completed(None) | StreamEvent::Error(_) => {}
        }
    }

    fn settle(&self, summary: TurnSummary) {
        let TurnSummary { transcript, .. } = summary;
        self.inner.state.send_modify(|conversation| {
            let displayed = conversation.last_message().map(|msg| msg.content());
            if displayed != Some(transcript.as_str()) {
                warn!(
                    "displayed answer diverged from the received one, \
                     replacing it: {displayed:?} != {transcript:?}"
                );
            }
            conversation.replace_last_content(transcript);
            conversation.mark_streaming_done();
            conversation.set_streaming(false);
        });
        self.inner.stage.send_replace(TurnStage::Settled);
        debug!("turn settled");
    }

    fn fail(&self, err: &Error, placeholder_added: bool) {
        error!("turn failed: {err:?}");
        self.roll_back(placeholder_added);

        let message = if err.message().is_empty() {
            "Failed to get response"
        } else {
            err.message()
        };
        self.inner.notifier.notify(Notification::error(message));
    }

    fn roll_back(&self, placeholder_added: bool) {
        self.inner.state.send_modify(|conversation| {
            if placeholder_added {
                conversation.rollback_last_message();
            }
            conversation.set_streaming(false);
        });
        self.inner.stage.send_replace(TurnStage::Failed);
    }
}

/// Rolls back a turn whose future was dropped while in flight.
struct TurnGuard<'a> {
    session: &'a ChatSession,
    placeholder_added: bool,
    finished: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("turn abandoned before it settled, rolling back");
            self.session.roll_back(self.placeholder_added);
        }
    }
}
