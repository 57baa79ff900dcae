//! Document ingestion tracking.
//!
//! After an upload is accepted, the server processes the document in the
//! background. [`DocumentTracker`] polls each document until it settles and
//! keeps a [`DocumentRegistry`] current, which is what a UI lists and what
//! a chat can be scoped to.

mod registry;
mod schedule;
mod tracker;

pub use registry::{DocumentRecord, DocumentRegistry};
pub use schedule::{PollEnd, PollPolicy, PollSchedule, PollStep};
pub use tracker::{
    DocumentTracker, DocumentTrackerBuilder, MAX_UPLOAD_SIZE, TrackHandle,
};
