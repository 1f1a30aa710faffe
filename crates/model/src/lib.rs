//! An abstraction layer for different LLMs.
//!
//! This crate establishes an unified protocol for the agent to interact
//! with various supported LLMs, so that the agent can seamlessly switch
//! between them without modifying the core codebase.
//!
//! Providers deliver their answers as a stream of [`ModelFragment`]s,
//! the raw incremental units of a response. Assembling fragments into a
//! complete [`AssistantTurn`] is left to the agent, so that every
//! provider gets the same ordering and validation rules.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
