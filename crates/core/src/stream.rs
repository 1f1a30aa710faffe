//! Reconstruction of an assistant turn from a stream of fragments.

use std::collections::BTreeMap;
use std::pin::pin;

use futures_util::{Stream, StreamExt};
use turnloop_model::{
    AssistantTurn, Attachment, ModelFragment, ModelProviderError,
    ToolCallDelta, ToolCallRequest,
};

use crate::Error;
use crate::stage::ContentSink;

/// The item type of a type-erased fragment stream.
pub type FragmentResult = Result<ModelFragment, Box<dyn ModelProviderError>>;

/// Incrementally assembles an [`AssistantTurn`] from [`ModelFragment`]s.
///
/// Text is forwarded to the sink as soon as it arrives. Tool calls are
/// keyed by their position index: the first delta at an index opens the
/// call with its id and name, later deltas append argument text in arrival
/// order. Out-of-order deltas are rejected rather than buffered.
#[derive(Debug, Default)]
pub struct Reconstructor {
    text: String,
    calls: BTreeMap<u32, ToolCallRequest>,
    attachments: Vec<Attachment>,
}

impl Reconstructor {
    /// Creates an empty reconstructor.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment.
    ///
    /// An error means the stream is malformed and the reconstructor should
    /// be discarded.
    pub fn push<S: ContentSink + ?Sized>(
        &mut self,
        fragment: ModelFragment,
        sink: &S,
    ) -> Result<(), Error> {
        // A fragment is applied whole or not at all, so the deltas are
        // staged before anything reaches the sink.
        if !fragment.tool_calls.is_empty() {
            let mut staged = self.calls.clone();
            for delta in fragment.tool_calls {
                apply_tool_call_delta(&mut staged, delta)?;
            }
            self.calls = staged;
        }
        if let Some(text) = fragment.text.filter(|text| !text.is_empty()) {
            sink.append_text(&text);
            self.text.push_str(&text);
        }
        for attachment in fragment.attachments {
            sink.add_attachment(&attachment);
            self.attachments.push(attachment);
        }
        if let Some(reason) = fragment.finish_reason {
            trace!("model finished with reason: {reason:?}");
        }
        Ok(())
    }

    /// Finalizes the turn, ordering tool calls by their index.
    pub fn finish(self) -> AssistantTurn {
        let content = (!self.text.is_empty()).then_some(self.text);
        AssistantTurn {
            content,
            tool_calls: self.calls.into_values().collect(),
            attachments: self.attachments,
        }
    }
}

fn apply_tool_call_delta(
    calls: &mut BTreeMap<u32, ToolCallRequest>,
    delta: ToolCallDelta,
) -> Result<(), Error> {
    let ToolCallDelta {
        index,
        id,
        name,
        arguments,
    } = delta;

    let Some(id) = id else {
        let Some(call) = calls.get_mut(&index) else {
            return Err(Error::Protocol(format!(
                "tool call delta at index {index} arrived before the \
                 call was opened"
            )));
        };
        if let Some(arguments) = arguments {
            call.arguments.push_str(&arguments);
        }
        return Ok(());
    };

    if let Some(call) = calls.get_mut(&index) {
        if call.id != id {
            return Err(Error::Protocol(format!(
                "tool call `{id}` conflicts with `{}` at index {index}",
                call.id
            )));
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(&arguments);
        }
        return Ok(());
    }

    if calls.values().any(|call| call.id == id) {
        return Err(Error::Protocol(format!(
            "tool call id `{id}` is used at more than one index"
        )));
    }
    let Some(name) = name.filter(|name| !name.is_empty()) else {
        return Err(Error::Protocol(format!(
            "tool call `{id}` at index {index} has no name"
        )));
    };
    calls.insert(
        index,
        ToolCallRequest {
            id,
            name,
            arguments: arguments.unwrap_or_default(),
        },
    );
    Ok(())
}

/// Drains the fragment stream into a finalized [`AssistantTurn`].
///
/// A provider error in the middle of the stream aborts the turn. Text that
/// has already been forwarded to the sink stays there.
pub async fn reconstruct<St, S>(
    stream: St,
    sink: &S,
) -> Result<AssistantTurn, Error>
where
    St: Stream<Item = FragmentResult>,
    S: ContentSink + ?Sized,
{
    let mut stream = pin!(stream);
    let mut reconstructor = Reconstructor::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment.map_err(|err| {
            error!("got an error while streaming: {err}");
            Error::Model(err)
        })?;
        trace!("got a fragment: {fragment:?}");
        reconstructor.push(fragment, sink).inspect_err(|err| {
            warn!("discarding the turn: {err}");
        })?;
    }
    Ok(reconstructor.finish())
}
