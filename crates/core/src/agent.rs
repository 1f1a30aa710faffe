mod builder;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::Instrument;
use turnloop_model::{
    AssistantTurn, ModelMessage, ModelRequest, ModelTool, ToolCallRequest,
    ToolCallResult,
};

use crate::Error;
use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::stage::Progress;
use crate::tool::{CallOutcome, Dispatcher};
pub use builder::AgentBuilder;

/// What the agent does when some calls of a tool round fail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ToolFailurePolicy {
    /// Fail the whole user turn with the first error, in call order. The
    /// round is not appended to the conversation.
    #[default]
    Abort,
    /// Hand the error text back to the model as the call result and keep
    /// going.
    ReportToModel,
}

/// An agent drives the loop between the model and the tools.
///
/// The agent only holds immutable configuration. Conversation state lives
/// in [`Conversation`], which is lent to [`Agent::respond`] for the
/// duration of one user turn, so a single agent can serve any number of
/// conversations concurrently.
#[derive(Clone)]
pub struct Agent {
    model_client: ModelClient,
    dispatcher: Arc<Dispatcher>,
    system_prompt: Option<String>,
    max_turns: usize,
    model_timeout: Option<Duration>,
    failure_policy: ToolFailurePolicy,
}

impl Agent {
    /// Handles one user input until the model produces a final answer.
    ///
    /// The input is appended to the conversation first. Every tool round
    /// is appended only after all of its calls have settled, and the final
    /// turn is appended before it is returned. Assistant text and tool
    /// output are streamed into `progress` as they arrive.
    pub async fn respond<P: Progress + ?Sized>(
        &self,
        conversation: &mut Conversation,
        input: impl Into<String>,
        progress: &P,
    ) -> Result<AssistantTurn, Error> {
        conversation.push_user_input(input.into());
        let tools = self.dispatcher.definitions();
        let span = debug_span!(
            "agent respond",
            conversation_id = %conversation.identity().conversation_id
        );

        async move {
            for turn_idx in 0..self.max_turns {
                let req = self.make_request(conversation, &tools);
                let turn = self.request_turn(req, progress).await?;
                if !turn.has_tool_calls() {
                    debug!("got the final answer at turn {turn_idx}");
                    conversation.push_assistant_turn(turn.clone());
                    return Ok(turn);
                }

                if turn_idx + 1 == self.max_turns {
                    // No turn would be left to consume the results.
                    warn!(
                        "giving up after {} turns, skipping {} tool calls",
                        self.max_turns,
                        turn.tool_calls.len()
                    );
                    return Err(Error::TurnLimitExceeded(self.max_turns));
                }
                debug!(
                    "turn {turn_idx} requested {} tool calls",
                    turn.tool_calls.len()
                );
                let outcomes = self
                    .dispatcher
                    .dispatch(&turn.tool_calls, progress, conversation.identity())
                    .await;
                let results = self.settle(&turn.tool_calls, outcomes)?;
                conversation.push_tool_round(turn, results);
            }
            warn!("giving up after {} turns", self.max_turns);
            Err(Error::TurnLimitExceeded(self.max_turns))
        }
        .instrument(span)
        .await
    }

    fn make_request(
        &self,
        conversation: &Conversation,
        tools: &[ModelTool],
    ) -> ModelRequest {
        let messages = self
            .system_prompt
            .iter()
            .map(|prompt| ModelMessage::System(prompt.clone()))
            .chain(conversation.messages().cloned())
            .collect();
        ModelRequest {
            messages,
            tools: tools.to_vec(),
            identity: conversation.identity().clone(),
            ..Default::default()
        }
    }

    async fn request_turn<P: Progress + ?Sized>(
        &self,
        req: ModelRequest,
        progress: &P,
    ) -> Result<AssistantTurn, Error> {
        let fut = self.model_client.send_request(req, progress);
        match self.model_timeout {
            Some(deadline) => timeout(deadline, fut).await.unwrap_or_else(|_| {
                warn!("model turn timed out after {deadline:?}");
                Err(Error::Timeout(deadline))
            }),
            None => fut.await,
        }
    }

    fn settle(
        &self,
        calls: &[ToolCallRequest],
        outcomes: Vec<CallOutcome>,
    ) -> Result<Vec<ToolCallResult>, Error> {
        match self.failure_policy {
            ToolFailurePolicy::Abort => outcomes.into_iter().collect(),
            ToolFailurePolicy::ReportToModel => Ok(outcomes
                .into_iter()
                .zip(calls)
                .map(|(outcome, call)| {
                    outcome.unwrap_or_else(|err| ToolCallResult {
                        id: call.id.clone(),
                        content: Some(format!("Error: {err}")),
                        attachments: vec![],
                    })
                })
                .collect()),
        }
    }
}
