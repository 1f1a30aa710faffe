//! Tool call supports.

mod dispatcher;
mod error;
mod object;

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use turnloop_model::{Attachment, RequestIdentity};

use crate::stage::Segment;
pub(crate) use dispatcher::{CallOutcome, Dispatcher};
pub use error::{Error, ErrorKind};

/// The result of a tool call.
pub type ToolResult = Result<ToolOutput, Error>;

/// The successful output of a tool call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// The text handed back to the model.
    pub content: Option<String>,
    /// Attachments produced by the call.
    pub attachments: Vec<Attachment>,
}

impl From<String> for ToolOutput {
    #[inline]
    fn from(content: String) -> Self {
        Self {
            content: Some(content),
            attachments: vec![],
        }
    }
}

impl From<&str> for ToolOutput {
    #[inline]
    fn from(content: &str) -> Self {
        content.to_owned().into()
    }
}

/// Per-call information handed to [`Tool::execute`].
#[derive(Clone)]
pub struct ToolContext {
    /// The identifier of the call, as chosen by the model.
    pub call_id: String,
    /// The identity of the conversation this call belongs to.
    pub identity: RequestIdentity,
    /// The progress segment opened for this call. The dispatcher closes it
    /// once the call settles.
    pub segment: Arc<dyn Segment>,
}

impl Debug for ToolContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("call_id", &self.call_id)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain
/// any conversation state. Everything that is specific to one call arrives
/// through the [`ToolContext`].
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Whether the raw call arguments should be rendered into the progress
    /// segment before the call runs.
    fn display_in_output(&self) -> bool {
        true
    }

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
