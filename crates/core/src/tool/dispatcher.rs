use std::collections::HashMap;
use std::future::ready;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::time::timeout;
use tracing::Instrument;
use turnloop_model::{
    ModelTool, RequestIdentity, ToolCallRequest, ToolCallResult,
};

use super::object::{ToolObject, ToolObjectImpl};
use super::{Error as ToolError, Tool, ToolContext};
use crate::Error;
use crate::stage::{ContentSink, Progress};

/// The settled state of one tool call.
pub(crate) type CallOutcome = Result<ToolCallResult, Error>;

type BoxedCallFuture = Pin<Box<dyn Future<Output = CallOutcome> + Send>>;

/// Resolves tool calls against the registered tools and runs them.
#[derive(Default)]
pub(crate) struct Dispatcher {
    tools: HashMap<String, Box<dyn ToolObject>>,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        if self
            .tools
            .insert(name.clone(), Box::new(ToolObjectImpl(tool)))
            .is_some()
        {
            warn!("tool `{name}` registered more than once, keeping the last");
        }
    }

    #[inline]
    pub fn set_call_timeout(&mut self, call_timeout: Option<Duration>) {
        self.call_timeout = call_timeout;
    }

    /// Returns the catalog sent to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Runs all calls concurrently and returns their outcomes in call
    /// order. A failing call never cancels its siblings.
    pub async fn dispatch<P: Progress + ?Sized>(
        &self,
        calls: &[ToolCallRequest],
        progress: &P,
        identity: &RequestIdentity,
    ) -> Vec<CallOutcome> {
        let span = debug_span!("tool dispatch", calls = calls.len());
        let futures: Vec<_> = {
            let _enter = span.enter();
            calls
                .iter()
                .map(|call| self.start_call(call, progress, identity))
                .collect()
        };
        join_all(futures).instrument(span).await
    }

    fn start_call<P: Progress + ?Sized>(
        &self,
        call: &ToolCallRequest,
        progress: &P,
        identity: &RequestIdentity,
    ) -> BoxedCallFuture {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!("tool not found: {}", call.name);
            return Box::pin(ready(Err(Error::UnknownTool {
                call_id: call.id.clone(),
                name: call.name.clone(),
            })));
        };

        let segment = progress.open_segment(tool.name());
        if tool.display_in_output() {
            render_arguments(&*segment, &call.arguments);
        }

        let ctx = ToolContext {
            call_id: call.id.clone(),
            identity: identity.clone(),
            segment: Arc::clone(&segment),
        };
        trace!("spawning a tool ({}) with args: {}", call.id, call.arguments);
        let fut = tool.execute(&call.arguments, ctx);

        let call_id = call.id.clone();
        let call_timeout = self.call_timeout;
        Box::pin(async move {
            let result = match call_timeout {
                Some(call_timeout) => {
                    timeout(call_timeout, fut).await.unwrap_or_else(|_| {
                        Err(ToolError::timeout().with_reason(format!(
                            "no result after {call_timeout:?}"
                        )))
                    })
                }
                None => fut.await,
            };
            segment.close();

            match result {
                Ok(output) => {
                    trace!("tool call ({call_id}) finished");
                    Ok(ToolCallResult {
                        id: call_id,
                        content: output.content,
                        attachments: output.attachments,
                    })
                }
                Err(source) => {
                    warn!("tool call ({call_id}) failed: {source}");
                    Err(Error::ToolExecution { call_id, source })
                }
            }
        })
    }
}

fn render_arguments<S: ContentSink + ?Sized>(sink: &S, arguments: &str) {
    let pretty = serde_json::from_str::<Value>(arguments)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| arguments.to_owned());
    sink.append_text(&format!(
        "## Request arguments:\n\n```json\n{pretty}\n```\n\n## Response:\n\n"
    ));
}
