use rmcp::service::ServiceError;
use thiserror::Error;

use crate::client::ClientStatus;

/// Errors returned by [`McpClient`](crate::McpClient).
#[derive(Debug, Error)]
pub enum Error {
    /// The operation is not allowed in the current session state.
    #[error("operation not allowed while the client is {0}")]
    SessionState(ClientStatus),

    /// The server could not be reached, or the session broke down.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Server {
        /// The JSON-RPC error code.
        code: i64,
        /// The error message.
        message: String,
    },

    /// The tool ran and reported a failure.
    #[error("tool reported an error: {0}")]
    ToolReported(String),

    /// The server answered with something that is not a valid reply.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::McpError(data) => Error::Server {
                code: i64::from(data.code.0),
                message: data.message.into_owned(),
            },
            err => Error::Transport(format!("{err}")),
        }
    }
}
