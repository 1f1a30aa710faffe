use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use turnloop_model::{
    AssistantTurn, Attachment, ModelFinishReason, ModelFragment, ModelMessage,
    ModelRequest, ModelTool, ToolCallDelta, ToolCallRequest, ToolCallResult,
};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionToolCall>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomContent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub custom_content: Option<CustomContent>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_content: Option<CustomContent>,
    },
    Tool {
        tool_call_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_content: Option<CustomContent>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_fields: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: req
            .deployment
            .clone()
            .unwrap_or_else(|| config.model.clone()),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        custom_fields: req.custom_fields.clone(),
        stream_options: Some(StreamOptions {
            include_usage: true,
        }),
        stream: true,
    }
}

#[inline]
fn custom_content(attachments: &[Attachment]) -> Option<CustomContent> {
    if attachments.is_empty() {
        return None;
    }
    Some(CustomContent {
        attachments: attachments.to_vec(),
    })
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(turn) => create_assistant_message(turn),
        ModelMessage::Tool(result) => create_tool_message(result),
    }
}

fn create_assistant_message(turn: &AssistantTurn) -> Message {
    let tool_calls = if turn.tool_calls.is_empty() {
        None
    } else {
        Some(turn.tool_calls.iter().map(create_tool_call).collect())
    };
    Message::Assistant {
        content: turn.content.clone(),
        tool_calls,
        custom_content: custom_content(&turn.attachments),
    }
}

#[inline]
fn create_tool_call(req: &ToolCallRequest) -> ToolCall {
    ToolCall {
        index: None,
        id: Some(req.id.clone()),
        r#type: Some("function".to_owned()),
        function: Some(FunctionToolCall {
            name: Some(req.name.clone()),
            arguments: Some(req.arguments.clone()),
        }),
    }
}

#[inline]
fn create_tool_message(result: &ToolCallResult) -> Message {
    Message::Tool {
        tool_call_id: result.id.clone(),
        content: result.content.clone().unwrap_or_default(),
        custom_content: custom_content(&result.attachments),
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Converts a streamed choice into a fragment, `None` if the choice
/// carries nothing of interest (e.g. a role-only delta).
pub fn create_fragment(choice: Choice) -> Option<ModelFragment> {
    let Choice {
        delta,
        finish_reason,
    } = choice;

    let fragment = ModelFragment {
        text: delta.content.filter(|content| !content.is_empty()),
        tool_calls: delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(create_tool_call_delta)
            .collect(),
        attachments: delta
            .custom_content
            .map(|custom| custom.attachments)
            .unwrap_or_default(),
        finish_reason: finish_reason.map(|reason| {
            if reason == "tool_calls" {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            }
        }),
    };
    if fragment == ModelFragment::default() {
        return None;
    }
    Some(fragment)
}

#[inline]
fn create_tool_call_delta(tool_call: ToolCall) -> ToolCallDelta {
    let (name, arguments) = match tool_call.function {
        Some(function) => (function.name, function.arguments),
        None => (None, None),
    };
    ToolCallDelta {
        index: tool_call.index.unwrap_or_default(),
        id: tool_call.id.filter(|id| !id.is_empty()),
        name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a helpful assistant.".to_owned()),
                ModelMessage::User("Hello".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "shell".to_owned(),
                description: "Runs shell commands.".to_owned(),
                parameters: json!({
                    "type": "string",
                    "description": "The command line."
                }),
            }],
            ..Default::default()
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();
        let expected = ChatCompletionRequest {
            model: "custom".to_owned(),
            messages: vec![
                Message::System {
                    content: "You are a helpful assistant.".to_owned(),
                },
                Message::User {
                    content: "Hello".to_owned(),
                },
            ],
            tools: vec![Tool {
                r#type: "function",
                function: FunctionTool {
                    name: "shell".to_owned(),
                    description: "Runs shell commands.".to_owned(),
                    parameters: json!({
                        "type": "string",
                        "description": "The command line."
                    }),
                },
            }],
            custom_fields: None,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            stream: true,
        };
        assert_eq!(create_request(&request, &config), expected);
    }

    #[test]
    fn test_serialize_tool_round() {
        let mut custom_fields = Map::new();
        custom_fields.insert("size".to_owned(), json!("1024x1024"));
        let request = ModelRequest {
            messages: vec![
                ModelMessage::User("What is 2+2?".to_owned()),
                ModelMessage::Assistant(AssistantTurn {
                    content: None,
                    tool_calls: vec![ToolCallRequest {
                        id: "c1".to_owned(),
                        name: "calc".to_owned(),
                        arguments: r#"{"expr":"2+2"}"#.to_owned(),
                    }],
                    attachments: vec![],
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "c1".to_owned(),
                    content: Some("4".to_owned()),
                    attachments: vec![Attachment {
                        mime_type: Some("image/png".to_owned()),
                        title: Some("plot".to_owned()),
                        url: Some("files/plot.png".to_owned()),
                    }],
                }),
            ],
            deployment: Some("gpt-4o".to_owned()),
            custom_fields: Some(custom_fields),
            ..Default::default()
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx").build();
        let value =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "user", "content": "What is 2+2?" },
                    {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "c1",
                            "type": "function",
                            "function": {
                                "name": "calc",
                                "arguments": "{\"expr\":\"2+2\"}"
                            }
                        }]
                    },
                    {
                        "role": "tool",
                        "tool_call_id": "c1",
                        "content": "4",
                        "custom_content": {
                            "attachments": [{
                                "type": "image/png",
                                "title": "plot",
                                "url": "files/plot.png"
                            }]
                        }
                    }
                ],
                "custom_fields": { "size": "1024x1024" },
                "stream_options": { "include_usage": true },
                "stream": true
            })
        );
    }

    #[test]
    fn test_create_fragment() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "delta": {
                    "role": "assistant",
                    "tool_calls": [{
                        "index": 1,
                        "id": "call_b",
                        "type": "function",
                        "function": { "name": "calc", "arguments": "" }
                    }]
                },
                "finish_reason": null
            }]
        }))
        .unwrap();
        let fragment = create_fragment(chunk.choices[0].clone()).unwrap();
        assert_eq!(fragment.text, None);
        assert_eq!(
            fragment.tool_calls,
            vec![ToolCallDelta::start(1, "call_b", "calc").with_arguments("")]
        );

        let role_only: Choice = serde_json::from_value(json!({
            "delta": { "role": "assistant", "content": "" },
            "finish_reason": null
        }))
        .unwrap();
        assert_eq!(create_fragment(role_only), None);
    }
}
