//! Core logic including the question/answer turn loop, the conversation
//! state, and document ingestion tracking.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod backend_client;
pub mod conversation;
pub mod documents;
mod error;
mod notification;
mod session;

pub use documents::{
    DocumentRecord, DocumentRegistry, DocumentTracker, DocumentTrackerBuilder,
    MAX_UPLOAD_SIZE, PollPolicy, TrackHandle,
};
pub use error::{Error, ErrorKind};
pub use notification::{Notification, NotificationLevel};
pub use session::{ChatSession, ChatSessionBuilder, TurnOutcome, TurnStage};
