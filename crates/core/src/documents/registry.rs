use omnidocs_protocol::{Document, DocumentStatus, UploadResponse};

/// Ingestion state of one uploaded document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentRecord {
    /// Identity of the document.
    pub id: String,
    /// The uploaded file name.
    pub filename: String,
    /// Optional display title.
    pub title: Option<String>,
    /// Processing state.
    pub status: DocumentStatus,
    /// Number of indexed chunks, meaningful once completed.
    pub chunk_count: u32,
    /// Why processing failed, only set when failed.
    pub error_message: Option<String>,
}

impl DocumentRecord {
    /// Returns the title, or the file name when there is none.
    #[inline]
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or(self.filename.as_str())
    }

    pub(crate) fn from_upload(resp: UploadResponse, title: Option<String>) -> Self {
        Self {
            id: resp.id,
            filename: resp.filename,
            title: title.filter(|title| !title.is_empty()),
            status: resp.status,
            chunk_count: 0,
            error_message: None,
        }
    }
}

impl From<Document> for DocumentRecord {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename,
            title: doc.title,
            status: doc.status,
            chunk_count: doc.chunk_count,
            error_message: doc.error_message,
        }
    }
}

/// The set of known documents, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentRegistry {
    records: Vec<DocumentRecord>,
}

impl DocumentRegistry {
    /// Inserts a record in front, replacing any record with the same
    /// identity.
    pub fn insert(&mut self, record: DocumentRecord) {
        self.records.retain(|r| r.id != record.id);
        self.records.insert(0, record);
    }

    /// Merges a polled status into the record.
    ///
    /// Statuses only move forward: a report that would move the record back
    /// (or switch between the two terminal statuses) is ignored. Returns
    /// whether the record changed.
    pub fn merge_status(
        &mut self,
        id: &str,
        status: DocumentStatus,
        chunk_count: u32,
        error_message: Option<String>,
    ) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        let current = record.status;
        if status.rank() < current.rank()
            || (current.is_terminal() && status != current)
        {
            warn!("ignored a status regression of {id}: {current} -> {status}");
            return false;
        }
        let error_message = match status {
            DocumentStatus::Failed => error_message,
            _ => None,
        };
        if record.status == status
            && record.chunk_count == chunk_count
            && record.error_message == error_message
        {
            return false;
        }
        record.status = status;
        record.chunk_count = chunk_count;
        record.error_message = error_message;
        true
    }

    /// Moves a record back to `pending`, which only reprocessing does.
    pub fn reset_to_pending(&mut self, id: &str) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        record.status = DocumentStatus::Pending;
        record.chunk_count = 0;
        record.error_message = None;
        true
    }

    /// Removes a record.
    pub fn remove(&mut self, id: &str) -> Option<DocumentRecord> {
        let idx = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(idx))
    }

    /// Replaces every record, keeping the given order.
    #[inline]
    pub fn replace_all(&mut self, records: Vec<DocumentRecord>) {
        self.records = records;
    }

    /// Returns a record by identity.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Returns the documents that can be asked about.
    #[inline]
    pub fn ready_documents(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records
            .iter()
            .filter(|r| r.status == DocumentStatus::Completed)
    }

    /// Returns every record, newest first.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.iter()
    }

    /// Returns the number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
