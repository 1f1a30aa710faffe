use std::sync::Arc;
use std::time::Duration;

use turnloop_model::ModelProvider;

use super::{Agent, ToolFailurePolicy};
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::{Dispatcher, Tool};

const DEFAULT_MAX_TURNS: usize = 16;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    dispatcher: Dispatcher,
    system_prompt: Option<String>,
    max_turns: usize,
    model_timeout: Option<Duration>,
    failure_policy: ToolFailurePolicy,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder that shares an existing model client.
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            dispatcher: Dispatcher::default(),
            system_prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
            model_timeout: None,
            failure_policy: ToolFailurePolicy::default(),
        }
    }

    /// Sets the system prompt sent ahead of every request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.dispatcher.add_tool(tool);
        self
    }

    /// Limits the number of model round-trips in one user turn.
    ///
    /// Values below one are raised to one.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Sets a deadline for each model round-trip, retries included.
    #[inline]
    pub fn with_model_timeout(mut self, deadline: Duration) -> Self {
        self.model_timeout = Some(deadline);
        self
    }

    /// Sets a deadline for each tool call.
    #[inline]
    pub fn with_tool_timeout(mut self, deadline: Duration) -> Self {
        self.dispatcher.set_call_timeout(Some(deadline));
        self
    }

    /// Sets what happens when tool calls fail.
    #[inline]
    pub fn with_failure_policy(mut self, policy: ToolFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets how failed model requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.model_client = self.model_client.with_retry_policy(policy);
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            dispatcher,
            system_prompt,
            max_turns,
            model_timeout,
            failure_policy,
        } = self;

        Agent {
            model_client,
            dispatcher: Arc::new(dispatcher),
            system_prompt,
            max_turns,
            model_timeout,
            failure_policy,
        }
    }
}
