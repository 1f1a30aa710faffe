use std::sync::Arc;

use serde_json::{Map, Value};
use turnloop_core::stage::ContentSink;
use turnloop_core::tool::{Error as ToolError, Tool, ToolContext, ToolResult};
use turnloop_mcp::{Error as McpError, McpClient, ToolDescriptor};

/// A tool that forwards calls to a remote tool server.
pub struct McpTool {
    client: Arc<McpClient>,
    descriptor: ToolDescriptor,
}

impl McpTool {
    /// Wraps one tool advertised by the server.
    #[inline]
    pub fn new(client: Arc<McpClient>, descriptor: ToolDescriptor) -> Self {
        Self { client, descriptor }
    }

    /// Lists the tools of a connected client and wraps each of them.
    pub async fn discover(
        client: &Arc<McpClient>,
    ) -> Result<Vec<Self>, McpError> {
        let tools = client.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|descriptor| Self::new(Arc::clone(client), descriptor))
            .collect())
    }
}

impl Tool for McpTool {
    type Input = Map<String, Value>;

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.descriptor.input_schema
    }

    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = Arc::clone(&self.client);
        let name = self.descriptor.name.clone();
        async move {
            match client.call_tool(&name, input).await {
                Ok(text) => {
                    ctx.segment.append_text(&text);
                    Ok(text.into())
                }
                Err(McpError::ToolReported(text)) => {
                    Err(ToolError::execution_error().with_reason(text))
                }
                Err(err) => Err(ToolError::execution_error()
                    .with_reason(format!("{err}"))),
            }
        }
    }
}
