use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::response::{AssistantTurn, Attachment};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelRequest {
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
    /// Overrides the model (or deployment) configured in the provider.
    pub deployment: Option<String>,
    /// Extra provider-specific fields forwarded with the request.
    pub custom_fields: Option<Map<String, Value>>,
    /// The caller identity this request is made on behalf of.
    pub identity: RequestIdentity,
}

/// Opaque credentials that are threaded through every model round-trip
/// and tool call of a conversation.
///
/// Neither value is validated here; providers and tools decide how (and
/// whether) to use them.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    /// The API key of the caller. Empty means "use the provider default".
    pub api_key: String,
    /// The identifier of the conversation.
    pub conversation_id: String,
}

impl RequestIdentity {
    /// Creates an identity with the given API key and conversation id.
    #[inline]
    pub fn new<K: Into<String>, C: Into<String>>(
        api_key: K,
        conversation_id: C,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl std::fmt::Debug for RequestIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestIdentity")
            .field("api_key", &"<redacted>")
            .field("conversation_id", &self.conversation_id)
            .finish()
    }
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// A finalized assistant turn, possibly requesting tool calls.
    Assistant(AssistantTurn),
    /// A tool call result.
    Tool(ToolCallResult),
}

/// The result of calling a tool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The identifier of the tool call request this result answers.
    pub id: String,
    /// The textual result of the tool call.
    pub content: Option<String>,
    /// Files or links produced by the tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
