//! Wire types and backend contracts for the document question-answering
//! API.
//!
//! This crate describes what travels between the client and the remote
//! service: the framed chunks of a streamed answer, cited sources,
//! documents, sessions and account records. It also defines the traits a
//! backend implementation must satisfy, so the client logic can run
//! against the real HTTP API or a scripted one without changes.
//!
//! Apart from classifying decoded frames, types in this crate don't
//! define any behavior.

#![deny(missing_docs)]

mod account;
mod backend;
mod document;
mod error;
mod frame;
mod query;
mod session;
mod source;
mod stream;

pub use account::*;
pub use backend::*;
pub use document::*;
pub use error::*;
pub use frame::*;
pub use query::*;
pub use session::*;
pub use source::*;
pub use stream::*;
