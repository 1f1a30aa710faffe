use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Map, Value};
use turnloop_core::ModelClient;
use turnloop_core::tool::{
    Error as ToolError, Tool, ToolContext, ToolOutput, ToolResult,
};
use turnloop_model::{ModelMessage, ModelRequest};

#[derive(Deserialize, JsonSchema)]
pub struct DeploymentToolParameters {
    #[schemars(description = "The request handed to the deployment.")]
    prompt: String,
    /// Deployment specific options, forwarded as custom fields.
    #[serde(flatten)]
    #[schemars(skip)]
    extra: Map<String, Value>,
}

/// A tool that hands a prompt to another model deployment.
///
/// The deployment answers with a single streamed turn. Its text and
/// attachments go to the progress segment of the call as they arrive, and
/// become the tool result. The nested request carries no tools, so the
/// deployment cannot call back into the agent.
pub struct DeploymentTool {
    model_client: ModelClient,
    deployment: String,
    name: String,
    description: String,
    parameter_schema: Value,
}

impl DeploymentTool {
    /// Creates a tool for the given deployment, named after it.
    pub fn new<S: Into<String>>(
        model_client: ModelClient,
        deployment: S,
    ) -> Self {
        let deployment = deployment.into();
        DeploymentTool {
            model_client,
            name: deployment.replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
            description: format!(
                "Sends a prompt to the `{deployment}` deployment and returns \
                 its answer, including any generated attachments."
            ),
            deployment,
            parameter_schema: schema_for!(DeploymentToolParameters).to_value(),
        }
    }

    /// Overrides the tool name.
    #[inline]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the tool description.
    #[inline]
    pub fn with_description<S: Into<String>>(
        mut self,
        description: S,
    ) -> Self {
        self.description = description.into();
        self
    }

    /// Overrides the parameter schema, e.g. to advertise the options the
    /// deployment understands. The schema should keep a `prompt` field.
    #[inline]
    pub fn with_parameter_schema(mut self, schema: Value) -> Self {
        self.parameter_schema = schema;
        self
    }
}

impl Tool for DeploymentTool {
    type Input = DeploymentToolParameters;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let model_client = self.model_client.clone();
        let DeploymentToolParameters { prompt, extra } = input;
        let req = ModelRequest {
            messages: vec![ModelMessage::User(prompt)],
            tools: vec![],
            deployment: Some(self.deployment.clone()),
            custom_fields: (!extra.is_empty()).then_some(extra),
            identity: ctx.identity.clone(),
        };
        async move {
            let turn = model_client
                .send_request(req, &*ctx.segment)
                .await
                .map_err(|err| {
                    ToolError::execution_error().with_reason(format!("{err}"))
                })?;
            if turn.has_tool_calls() {
                warn!("deployment asked for tool calls, ignoring them");
            }
            Ok(ToolOutput {
                content: turn.content,
                attachments: turn.attachments,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use turnloop_core::stage::{MemoryProgress, Progress};
    use turnloop_core::tool::ErrorKind;
    use turnloop_model::{Attachment, RequestIdentity};
    use turnloop_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;

    fn context(progress: &MemoryProgress) -> ToolContext {
        ToolContext {
            call_id: "call-1".to_owned(),
            identity: RequestIdentity::new("key", "conv-7"),
            segment: progress.open_segment("image-gen"),
        }
    }

    fn picture() -> Attachment {
        Attachment {
            mime_type: Some("image/png".to_owned()),
            title: Some("cat".to_owned()),
            url: Some("https://cdn.example.com/cat.png".to_owned()),
        }
    }

    #[tokio::test]
    async fn test_forwards_prompt_and_options() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Here is ".to_owned()),
            PresetEvent::MessageDelta("your cat.".to_owned()),
            PresetEvent::Attachment(picture()),
        ]));
        let tool =
            DeploymentTool::new(ModelClient::new(provider.clone()), "image-gen");
        assert_eq!(tool.name(), "image_gen");

        let input: DeploymentToolParameters = serde_json::from_value(
            json!({ "prompt": "a cat", "size": "1024x1024" }),
        )
        .unwrap();
        let progress = MemoryProgress::new();
        let output = tool.execute(input, context(&progress)).await.unwrap();

        assert_eq!(output.content.as_deref(), Some("Here is your cat."));
        assert_eq!(output.attachments, vec![picture()]);

        let segment = &progress.segments()[0];
        assert_eq!(segment.text, "Here is your cat.");
        assert_eq!(segment.attachments, vec![picture()]);
        assert!(progress.text().is_empty());

        let requests = provider.requests();
        let req = &requests[0];
        assert_eq!(req.deployment.as_deref(), Some("image-gen"));
        assert_eq!(req.identity.conversation_id, "conv-7");
        assert!(req.tools.is_empty());
        assert_eq!(req.messages, vec![ModelMessage::User("a cat".to_owned())]);
        let custom_fields = req.custom_fields.as_ref().unwrap();
        assert_eq!(custom_fields["size"], "1024x1024");
        assert!(!custom_fields.contains_key("prompt"));
    }

    #[tokio::test]
    async fn test_no_options_means_no_custom_fields() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("ok".to_owned()),
        ]));
        let tool = DeploymentTool::new(ModelClient::new(provider.clone()), "x")
            .with_name("proxy")
            .with_description("Proxies prompts.");
        assert_eq!(tool.name(), "proxy");
        assert_eq!(tool.description(), "Proxies prompts.");

        let input = serde_json::from_value(json!({ "prompt": "hi" })).unwrap();
        let progress = MemoryProgress::new();
        tool.execute(input, context(&progress)).await.unwrap();

        assert_eq!(provider.requests()[0].custom_fields, None);
    }

    #[tokio::test]
    async fn test_model_failure_is_an_execution_error() {
        let provider = TestModelProvider::default();
        let tool = DeploymentTool::new(ModelClient::new(provider), "x");

        let input = serde_json::from_value(json!({ "prompt": "hi" })).unwrap();
        let progress = MemoryProgress::new();
        let err = tool.execute(input, context(&progress)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
    }

    #[test]
    fn test_schema_only_advertises_prompt() {
        let tool = DeploymentTool::new(
            ModelClient::new(TestModelProvider::default()),
            "x",
        );
        let schema = tool.parameter_schema();
        assert!(schema["properties"]["prompt"].is_object());
        assert_eq!(schema["properties"].as_object().unwrap().len(), 1);
    }
}
