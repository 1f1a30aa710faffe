use std::sync::Arc;

use turnloop_core::conversation::Conversation;
use turnloop_core::stage::Progress;
use turnloop_core::tool::Tool;
use turnloop_core::{Agent, AgentBuilder, Error, ModelClient};
use turnloop_mcp::{Error as McpError, McpClient};
use turnloop_model::{AssistantTurn, ModelProvider, RequestIdentity};

use crate::tools::*;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    model_client: ModelClient,
    agent_builder: AgentBuilder,
    identity: RequestIdentity,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let model_client = ModelClient::new(provider);
        let agent_builder =
            AgentBuilder::with_model_client(model_client.clone());
        Self {
            model_client,
            agent_builder,
            identity: RequestIdentity::default(),
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Sets the credentials threaded through every request of the session.
    #[inline]
    pub fn with_identity(mut self, identity: RequestIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.agent_builder = self.agent_builder.with_tool(tool);
        self
    }

    /// Registers every tool a connected remote tool server advertises.
    pub async fn with_mcp_tools(
        mut self,
        client: &Arc<McpClient>,
    ) -> Result<Self, McpError> {
        for tool in McpTool::discover(client).await? {
            debug!("registering remote tool `{}`", tool.name());
            self.agent_builder = self.agent_builder.with_tool(tool);
        }
        Ok(self)
    }

    /// Registers a tool that proxies prompts to another deployment of the
    /// session's model provider.
    pub fn with_deployment<S: Into<String>>(self, deployment: S) -> Self {
        let tool = DeploymentTool::new(self.model_client.clone(), deployment);
        self.with_tool(tool)
    }

    /// Adjusts the agent options that have no dedicated method here.
    #[inline]
    pub fn configure_agent(
        mut self,
        configure: impl FnOnce(AgentBuilder) -> AgentBuilder,
    ) -> Self {
        self.agent_builder = configure(self.agent_builder);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        Session {
            agent: self.agent_builder.build(),
            conversation: Conversation::new(self.identity),
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session pairs a fully configured agent with the conversation it
/// drives. It is basically a wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
    conversation: Conversation,
}

impl Session {
    /// Sends a message and waits for the final answer. Output is streamed
    /// into `progress` while the agent works.
    ///
    /// On error the conversation keeps the message and every completed
    /// round, so the next message continues from there.
    #[inline]
    pub async fn send_message<P: Progress + ?Sized>(
        &mut self,
        message: &str,
        progress: &P,
    ) -> Result<AssistantTurn, Error> {
        self.agent
            .respond(&mut self.conversation, message, progress)
            .await
    }

    /// The conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}
