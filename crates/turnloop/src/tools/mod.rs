//! Tools that models can use.

mod deployment;
mod mcp;

pub use deployment::DeploymentTool;
pub use mcp::McpTool;
