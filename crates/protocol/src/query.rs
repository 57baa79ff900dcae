use serde::{Deserialize, Serialize};

use crate::Source;

/// Number of excerpts retrieved per question unless configured otherwise.
pub const DEFAULT_TOP_K: u32 = 5;

/// A question for the assistant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The natural-language question.
    pub query: String,
    /// The conversation the question belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Restricts retrieval to these documents. `None` searches every
    /// processed document; an empty list is never sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    /// How many excerpts to retrieve.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Whether the answer should cite its sources.
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

fn default_include_sources() -> bool {
    true
}

impl QueryRequest {
    /// Creates a request with default retrieval settings.
    #[inline]
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            document_ids: None,
            top_k: DEFAULT_TOP_K,
            include_sources: true,
        }
    }

    /// Attaches the request to a session.
    #[inline]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restricts retrieval to the given documents. An empty selection
    /// lifts the restriction.
    #[inline]
    pub fn with_document_ids<I, S>(mut self, document_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = document_ids.into_iter().map(Into::into).collect();
        self.document_ids = if ids.is_empty() { None } else { Some(ids) };
        self
    }
}

/// A complete, non-streamed answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The answer text.
    pub answer: String,
    /// The cited sources.
    pub sources: Vec<Source>,
    /// The session the answer was recorded in.
    pub session_id: String,
    /// Identity of the recorded query.
    pub query_id: String,
    /// Whether the answer was served from cache.
    pub cached: bool,
    /// Server-side processing time.
    pub processing_time_ms: u64,
}

/// A previously asked question.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    /// Identity of the query.
    pub id: String,
    /// The question.
    pub query: String,
    /// The answer.
    pub answer: String,
    /// When the question was asked.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_omits_absent_fields() {
        let request = QueryRequest::new("What is our refund policy?");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "query": "What is our refund policy?",
                "top_k": 5,
                "include_sources": true
            })
        );

        let request = QueryRequest::new("Summarize")
            .with_session_id("s-1")
            .with_document_ids(["docA"]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "query": "Summarize",
                "session_id": "s-1",
                "document_ids": ["docA"],
                "top_k": 5,
                "include_sources": true
            })
        );
    }

    #[test]
    fn test_empty_selection_is_no_restriction() {
        let request =
            QueryRequest::new("Anything").with_document_ids(Vec::<String>::new());
        assert_eq!(request.document_ids, None);
    }
}
