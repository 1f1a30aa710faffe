use std::time::Duration;

use thiserror::Error;
use turnloop_model::ModelProviderError;

use crate::tool::Error as ToolError;

/// Errors that fail a model turn or a whole conversation turn.
#[derive(Debug, Error)]
pub enum Error {
    /// The response stream was malformed or out of order.
    #[error("malformed response stream: {0}")]
    Protocol(String),

    /// The model asked for a tool that is not registered.
    #[error("unknown tool `{name}` requested by call `{call_id}`")]
    UnknownTool {
        /// The identifier of the offending call.
        call_id: String,
        /// The requested tool name.
        name: String,
    },

    /// A tool failed while handling a call.
    #[error("tool call `{call_id}` failed: {source}")]
    ToolExecution {
        /// The identifier of the failed call.
        call_id: String,
        /// The error reported by the tool.
        source: ToolError,
    },

    /// The model provider failed, after retries where applicable.
    #[error("model request failed: {0}")]
    Model(Box<dyn ModelProviderError>),

    /// The model kept asking for tools past the configured limit.
    #[error("conversation exceeded {0} model turns")]
    TurnLimitExceeded(usize),

    /// A model round-trip did not finish before its deadline.
    #[error("model turn timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Returns the tool call this error is scoped to, if any.
    #[inline]
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Error::UnknownTool { call_id, .. }
            | Error::ToolExecution { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}
