use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Processing state of an uploaded document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Accepted, not yet picked up.
    #[default]
    Pending,
    /// Being chunked and indexed.
    Processing,
    /// Indexed and searchable.
    Completed,
    /// Processing gave up.
    Failed,
}

impl DocumentStatus {
    /// Whether no further transitions happen without an explicit
    /// reprocess.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// Position in the processing pipeline. Statuses only ever move to an
    /// equal or higher rank, except when a document is reprocessed.
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            DocumentStatus::Pending => 0,
            DocumentStatus::Processing => 1,
            DocumentStatus::Completed | DocumentStatus::Failed => 2,
        }
    }
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A document as stored by the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    /// Identity of the document.
    pub id: String,
    /// The owning organization.
    #[serde(default)]
    pub organization_id: String,
    /// The uploaded file name.
    pub filename: String,
    /// Optional display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Server-side storage path.
    #[serde(default)]
    pub file_path: String,
    /// Size in bytes.
    #[serde(default)]
    pub file_size: u64,
    /// MIME type of the uploaded file.
    #[serde(default)]
    pub mime_type: String,
    /// Processing state.
    pub status: DocumentStatus,
    /// Number of indexed chunks, meaningful once completed.
    #[serde(default)]
    pub chunk_count: u32,
    /// Why processing failed, only set when failed.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// The server's acknowledgement of an upload or reprocess request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Identity of the document.
    pub id: String,
    /// The stored file name.
    pub filename: String,
    /// Processing state right after the request.
    pub status: DocumentStatus,
    /// Human-readable acknowledgement.
    pub message: String,
}

/// A page of documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentListResponse {
    /// Documents on this page.
    pub documents: Vec<Document>,
    /// Total number of documents.
    pub total: u64,
    /// The page number, starting at 1.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
}

/// Parameters for listing documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentListQuery {
    /// The page number, starting at 1.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
    /// Only list documents in this state.
    pub status: Option<DocumentStatus>,
}

impl Default for DocumentListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            status: None,
        }
    }
}

/// A file to upload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentUpload {
    /// File name reported to the server.
    pub filename: String,
    /// File contents.
    pub bytes: Bytes,
    /// MIME type of the contents.
    pub content_type: String,
    /// Optional display title.
    pub title: Option<String>,
    /// Optional description.
    pub description: Option<String>,
}

impl DocumentUpload {
    /// Creates an upload for a PDF file.
    #[inline]
    pub fn pdf<S: Into<String>, B: Into<Bytes>>(filename: S, bytes: B) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            content_type: "application/pdf".to_owned(),
            title: None,
            description: None,
        }
    }

    /// Sets the display title.
    #[inline]
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[inline]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}
