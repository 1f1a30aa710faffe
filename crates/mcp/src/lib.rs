//! A client for remote tool servers speaking the Model Context Protocol
//! over streamable HTTP.
//!
//! [`McpClient`] owns the session lifecycle on top of an `rmcp` service.
//! The [`Connector`] trait decides how sessions are opened, so that the
//! client can be driven by an in-process server in tests.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod connector;
mod error;
mod types;

pub use client::{ClientStatus, McpClient};
pub use connector::{ClientService, Connector, HttpConnector, SessionHandler};
pub use error::Error;
pub use types::{Resource, ToolDescriptor};
