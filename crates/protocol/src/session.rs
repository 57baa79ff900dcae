use serde::{Deserialize, Serialize};

use crate::Source;

/// A server-tracked conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identity of the session.
    pub id: String,
    /// The owning organization.
    #[serde(default)]
    pub organization_id: String,
    /// Optional title.
    #[serde(default)]
    pub title: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Time of the most recent turn.
    #[serde(default)]
    pub last_activity: String,
    /// Number of recorded messages.
    #[serde(default)]
    pub message_count: u32,
    /// The recorded messages, when requested individually.
    #[serde(default)]
    pub messages: Option<Vec<SessionMessage>>,
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking.
    User,
    /// The assistant answering.
    Assistant,
}

/// A message recorded in a server session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// The author.
    pub role: Role,
    /// The text.
    pub content: String,
    /// When it was recorded.
    pub timestamp: String,
    /// The sources cited by an assistant message.
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
}

/// A page of sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionListResponse {
    /// Sessions on this page.
    pub sessions: Vec<Session>,
    /// Total number of sessions.
    pub total: u64,
}
