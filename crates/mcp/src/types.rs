use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rmcp::model::{
    CallToolResult, RawContent, ReadResourceResult, ResourceContents, Tool,
};
use serde_json::Value;

use crate::Error;

/// A tool advertised by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// The tool name.
    pub name: String,
    /// A human readable description, empty if the server gave none.
    pub description: String,
    /// The JSON schema of the tool arguments.
    pub input_schema: Value,
}

impl From<Tool> for ToolDescriptor {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.into_owned(),
            description: tool
                .description
                .map(|description| description.into_owned())
                .unwrap_or_default(),
            input_schema: Value::Object((*tool.input_schema).clone()),
        }
    }
}

/// The content of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// A textual resource.
    Text(String),
    /// A binary resource, already decoded.
    Blob(Vec<u8>),
    /// The server returned no usable content.
    Empty,
}

/// Joins the content parts in order. Text parts contribute their text,
/// everything else its JSON form. Falls back to the structured content when
/// there are no parts.
pub(crate) fn joined_text(result: &CallToolResult) -> String {
    if result.content.is_empty() {
        return result
            .structured_content
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
    }
    result
        .content
        .iter()
        .map(|content| match &content.raw {
            RawContent::Text(text) => text.text.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Picks the first content entry of a read result.
pub(crate) fn into_resource(
    result: ReadResourceResult,
) -> Result<Resource, Error> {
    let Some(contents) = result.contents.into_iter().next() else {
        return Ok(Resource::Empty);
    };
    match contents {
        ResourceContents::TextResourceContents { text, .. } => {
            Ok(Resource::Text(text))
        }
        ResourceContents::BlobResourceContents { blob, .. } => {
            let bytes = BASE64.decode(blob.trim()).map_err(|err| {
                Error::InvalidResponse(format!("invalid blob: {err}"))
            })?;
            Ok(Resource::Blob(bytes))
        }
    }
}
