//! An out-of-the-box agent that assembles the tools and model providers.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring agent functionality into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
mod session;
#[cfg(feature = "cli")]
pub mod terminal;
pub mod tools;

pub use config::{Config, ConfigError};
pub use session::{Session, SessionBuilder};

/// Re-exports of [`turnloop_core`] crate.
pub mod core {
    pub use turnloop_core::*;
}

/// Re-exports of [`turnloop_mcp`] crate.
pub mod mcp {
    pub use turnloop_mcp::*;
}
