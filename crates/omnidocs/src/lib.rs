//! An out-of-the-box client for the document question-answering service.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to ask questions about your documents from your own
//! host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;

pub use client::{Client, ClientBuilder};

/// Re-exports of [`omnidocs_core`] crate.
pub mod core {
    pub use omnidocs_core::*;
}

/// Re-exports of [`omnidocs_protocol`] crate.
pub mod protocol {
    pub use omnidocs_protocol::*;
}

/// Re-exports of [`omnidocs_http`] crate.
pub mod http {
    pub use omnidocs_http::*;
}
