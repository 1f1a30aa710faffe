use serde::{Deserialize, Serialize};
use turnloop_model::{Attachment, ModelFragment, ToolCallDelta};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    /// A complete tool call, sent as one delta at the next free index.
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta(ToolCallDelta),
    #[serde(rename = "attachment")]
    Attachment(Attachment),
    /// A raw fragment, sent as is.
    #[serde(rename = "fragment")]
    Fragment(ModelFragment),
}

impl PresetEvent {
    /// Creates a complete tool call event.
    #[inline]
    pub fn tool_call<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failure` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Converts the events into the fragments a provider would stream.
    pub(crate) fn fragments(&self) -> Vec<ModelFragment> {
        let mut next_index = 0;
        self.events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => ModelFragment::text(msg),
                PresetEvent::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    let delta = ToolCallDelta::start(next_index, id, name)
                        .with_arguments(arguments);
                    next_index += 1;
                    ModelFragment::tool_calls([delta])
                }
                PresetEvent::ToolCallDelta(delta) => {
                    next_index = next_index.max(delta.index + 1);
                    ModelFragment::tool_calls([delta.clone()])
                }
                PresetEvent::Attachment(attachment) => ModelFragment {
                    attachments: vec![attachment.clone()],
                    ..Default::default()
                },
                PresetEvent::Fragment(fragment) => fragment.clone(),
            })
            .collect()
    }
}
