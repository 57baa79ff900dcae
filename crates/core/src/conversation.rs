//! Conversation-related types.
//!
//! A [`Conversation`] is the in-memory transcript of one chat: the ordered
//! messages, the most recent source list, the server-side session identity
//! and the documents the next question is scoped to. Mutations go through
//! the named operations below, which keep these invariants:
//!
//! - Message identities strictly increase, even across [`Conversation::reset`].
//! - Content only grows through [`Conversation::append_to_last`]; the only
//!   other ways to change it are [`Conversation::replace_last_content`] and
//!   [`Conversation::rollback_last_message`].

pub use omnidocs_protocol::Role;
use omnidocs_protocol::Source;

/// One transcript entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    id: u64,
    role: Role,
    content: String,
    streaming: bool,
    sources: Option<Vec<Source>>,
}

impl Message {
    /// Returns the locally assigned identity.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the author.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text received so far.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the content may still change.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Returns the sources cited by this message, if any arrived.
    #[inline]
    pub fn sources(&self) -> Option<&[Source]> {
        self.sources.as_deref()
    }
}

/// Represents a conversation.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    sources: Vec<Source>,
    session_id: Option<String>,
    selected_documents: Vec<String>,
    streaming: bool,
    next_id: u64,
}

impl Conversation {
    /// Appends a message with a fresh identity.
    pub fn add_message<S: Into<String>>(
        &mut self,
        role: Role,
        content: S,
        streaming: bool,
    ) {
        self.next_id += 1;
        self.messages.push(Message {
            id: self.next_id,
            role,
            content: content.into(),
            streaming,
            sources: None,
        });
    }

    /// Appends a fragment to the last message. Does nothing if the
    /// transcript is empty.
    #[inline]
    pub fn append_to_last(&mut self, fragment: &str) {
        if let Some(last) = self.messages.last_mut() {
            last.content.push_str(fragment);
        }
    }

    /// Replaces the content of the last message wholesale.
    #[inline]
    pub fn replace_last_content<S: Into<String>>(&mut self, content: S) {
        if let Some(last) = self.messages.last_mut() {
            last.content = content.into();
        }
    }

    /// Replaces the current source list.
    ///
    /// The list is also attached to the last message when it's an assistant
    /// message still being streamed.
    pub fn set_sources(&mut self, sources: Vec<Source>) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant && last.streaming {
                last.sources = Some(sources.clone());
            }
        }
        self.sources = sources;
    }

    /// Clears the streaming flag of the most recent assistant message.
    pub fn mark_streaming_done(&mut self) {
        if let Some(last) = self
            .messages
            .iter_mut()
            .rev()
            .find(|msg| msg.role == Role::Assistant)
        {
            last.streaming = false;
        }
    }

    /// Removes the last message.
    #[inline]
    pub fn rollback_last_message(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    /// Begins a brand-new conversation.
    ///
    /// The document selection is kept, since it belongs to the user rather
    /// than to a conversation.
    pub fn reset(&mut self) {
        self.clear();
        self.session_id = None;
    }

    /// Clears the transcript and the sources, keeping the session identity.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.sources.clear();
        self.streaming = false;
    }

    /// Sets the server-side session identity.
    #[inline]
    pub fn set_session_id<S: Into<String>>(&mut self, session_id: S) {
        self.session_id = Some(session_id.into());
    }

    /// Sets the "currently streaming" flag.
    #[inline]
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Sets the documents the next question is scoped to. An empty list
    /// searches every processed document.
    #[inline]
    pub fn select_documents(&mut self, document_ids: Vec<String>) {
        self.selected_documents = document_ids;
    }
}

impl Conversation {
    /// Returns the transcript.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the last message, if any.
    #[inline]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the most recent source list.
    #[inline]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Returns the server-side session identity.
    #[inline]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Returns the documents the next question is scoped to.
    #[inline]
    pub fn selected_documents(&self) -> &[String] {
        &self.selected_documents
    }

    /// Whether a turn is in flight.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(chunk_id: &str) -> Source {
        Source {
            document_id: "doc-1".to_owned(),
            document_title: "Handbook".to_owned(),
            chunk_id: chunk_id.to_owned(),
            content: "Employees accrue leave monthly.".to_owned(),
            page_number: Some(3),
            section_header: None,
            relevance_score: 0.87,
        }
    }

    #[test]
    fn test_append_deltas() {
        let mut conversation = Conversation::default();
        conversation.add_message(Role::User, "Say hello", false);
        conversation.add_message(Role::Assistant, "", true);
        for delta in ["Hel", "lo", " world"] {
            conversation.append_to_last(delta);
        }

        let last = conversation.last_message().unwrap();
        assert_eq!(last.content(), "Hello world");
        assert!(last.is_streaming());
        assert_eq!(conversation.messages()[0].content(), "Say hello");
    }

    #[test]
    fn test_empty_transcript_is_noop() {
        let mut conversation = Conversation::default();
        conversation.append_to_last("lost");
        conversation.replace_last_content("lost");
        conversation.mark_streaming_done();
        assert!(conversation.rollback_last_message().is_none());
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn test_identities_increase() {
        let mut conversation = Conversation::default();
        conversation.add_message(Role::User, "a", false);
        conversation.add_message(Role::Assistant, "b", false);
        let before = conversation.last_message().unwrap().id();
        conversation.reset();
        conversation.add_message(Role::User, "c", false);
        assert!(conversation.last_message().unwrap().id() > before);
    }

    #[test]
    fn test_sources_attach_to_streaming_answer() {
        let mut conversation = Conversation::default();
        conversation.add_message(Role::User, "Leave policy?", false);
        conversation.add_message(Role::Assistant, "", true);
        conversation.set_sources(vec![source("c-1")]);
        conversation.set_sources(vec![source("c-2"), source("c-3")]);

        assert_eq!(conversation.sources().len(), 2);
        let attached = conversation.last_message().unwrap().sources().unwrap();
        assert_eq!(attached[0].chunk_id, "c-2");
        assert!(conversation.messages()[0].sources().is_none());
    }

    #[test]
    fn test_mark_streaming_done_and_rollback() {
        let mut conversation = Conversation::default();
        conversation.add_message(Role::User, "Q", false);
        conversation.add_message(Role::Assistant, "", true);
        conversation.mark_streaming_done();
        assert!(!conversation.last_message().unwrap().is_streaming());

        let removed = conversation.rollback_last_message().unwrap();
        assert_eq!(removed.role(), Role::Assistant);
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_clear_and_reset() {
        let mut conversation = Conversation::default();
        conversation.set_session_id("s-1");
        conversation.select_documents(vec!["doc-1".to_owned()]);
        conversation.add_message(Role::User, "Q", false);
        conversation.set_sources(vec![source("c-1")]);
        conversation.set_streaming(true);

        conversation.clear();
        assert!(conversation.messages().is_empty());
        assert!(conversation.sources().is_empty());
        assert!(!conversation.is_streaming());
        assert_eq!(conversation.session_id(), Some("s-1"));

        conversation.reset();
        assert_eq!(conversation.session_id(), None);
        assert_eq!(conversation.selected_documents(), ["doc-1"]);
    }
}
