use serde::{Deserialize, Serialize};

/// A cited excerpt from one of the organization's documents.
///
/// A full list of sources arrives once per turn and replaces the previous
/// one; sources are never merged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// The document this excerpt was taken from.
    pub document_id: String,
    /// Display title of the document.
    pub document_title: String,
    /// Identity of the indexed chunk.
    pub chunk_id: String,
    /// The excerpt text.
    pub content: String,
    /// Page the excerpt starts on, if the document is paginated.
    #[serde(default)]
    pub page_number: Option<u32>,
    /// Closest section header above the excerpt.
    #[serde(default)]
    pub section_header: Option<String>,
    /// Retrieval score, conventionally within `0.0..=1.0`. It is passed
    /// through as received.
    pub relevance_score: f64,
}
