use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;

/// A response from the model provider.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Attempts to pull out the next fragment from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next fragment. Implementations will ensure that the current
    ///   task will be notified when the next fragment may be ready.
    /// - `Poll::Ready(Ok(Some(fragment)))` means the response has a
    ///   fragment to deliver, and may produce further fragments on
    ///   subsequent `poll_next_fragment` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the response.
    ///
    /// Fragments must be delivered in the order the provider produced
    /// them. Calling this method after completion should always return
    /// `None`.
    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelFragment>, Self::Error>>;
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
}

/// One incremental unit of a streamed response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelFragment {
    /// A piece of the assistant text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Pieces of tool call requests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
    /// Attachments produced along with the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Set on the fragment that finishes the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelFragment {
    /// Creates a fragment carrying a text delta only.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Creates a fragment carrying tool call deltas only.
    #[inline]
    pub fn tool_calls(deltas: impl Into<Vec<ToolCallDelta>>) -> Self {
        Self {
            tool_calls: deltas.into(),
            ..Default::default()
        }
    }
}

/// A piece of a tool call request, tagged with the position of the call
/// within the response.
///
/// The first delta for an index carries the `id` and `name` of the call.
/// Later deltas for the same index only carry a suffix of the argument
/// text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// The position of the tool call within the response.
    pub index: u32,
    /// The identifier of the call, present on the first delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The name of the tool, present on the first delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// A suffix of the JSON argument text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    /// Creates the opening delta of a tool call.
    #[inline]
    pub fn start<I: Into<String>, N: Into<String>>(
        index: u32,
        id: I,
        name: N,
    ) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: None,
        }
    }

    /// Creates a delta that appends argument text to a started call.
    #[inline]
    pub fn arguments<S: Into<String>>(index: u32, suffix: S) -> Self {
        Self {
            index,
            id: None,
            name: None,
            arguments: Some(suffix.into()),
        }
    }

    /// Attaches an argument suffix to this delta.
    #[inline]
    pub fn with_arguments<S: Into<String>>(mut self, suffix: S) -> Self {
        self.arguments = Some(suffix.into());
        self
    }
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The JSON text of the arguments, as produced by the model.
    pub arguments: String,
}

/// A file or link attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    /// The MIME type of the attachment.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// A human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Where the attachment can be fetched from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A complete assistant turn, assembled from a response stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// The text of the turn, absent if the model produced none.
    pub content: Option<String>,
    /// Tool calls requested by the model, in response order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Attachments produced along with the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl AssistantTurn {
    /// Returns `true` if the model asked for at least one tool call.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
