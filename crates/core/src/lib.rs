//! Core logic including the agent loop, streaming turn reconstruction and
//! concurrent tool dispatch.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod error;
mod model_client;
pub mod stage;
pub mod stream;
pub mod tool;

pub use agent::{Agent, AgentBuilder, ToolFailurePolicy};
pub use error::Error;
pub use model_client::{ModelClient, RetryPolicy};
