//! Reading server-sent events from streamed HTTP bodies.
//!
//! Both the model providers and the remote tool protocol client receive
//! `text/event-stream` bodies, this crate holds the shared reader.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::{Error, Event, Sse};
