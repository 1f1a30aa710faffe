use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Barrier;
use tokio::time::timeout;
use turnloop_model::{
    ModelMessage, RequestIdentity, ToolCallDelta, ToolCallResult,
};
use turnloop_test_model::{PresetEvent, PresetResponse, TestModelProvider};

use crate::conversation::Conversation;
use crate::stage::{ContentSink, MemoryProgress, NoopProgress};
use crate::tool::{
    Error as ToolError, ErrorKind, Tool, ToolContext, ToolResult,
};
use crate::{AgentBuilder, Error, RetryPolicy, ToolFailurePolicy};

#[derive(Deserialize)]
struct CalcInput {
    expr: String,
}

/// Adds up `a+b+...` expressions.
struct CalcTool {
    schema: Value,
}

impl CalcTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": { "expr": { "type": "string" } },
                "required": ["expr"],
            }),
        }
    }
}

impl Tool for CalcTool {
    type Input = CalcInput;

    fn name(&self) -> &str {
        "calc"
    }

    fn description(&self) -> &str {
        "Evaluates a sum"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            let sum = input
                .expr
                .split('+')
                .map(|term| term.trim().parse::<i64>())
                .sum::<Result<i64, _>>()
                .map_err(|err| {
                    ToolError::execution_error().with_reason(err.to_string())
                })?;
            ctx.segment.append_text(&sum.to_string());
            Ok(sum.to_string().into())
        }
    }
}

/// Waits for a number of sibling calls, then either succeeds or fails.
struct GateTool {
    name: &'static str,
    barrier: Arc<Barrier>,
    fail: bool,
    schema: Value,
}

impl Tool for GateTool {
    type Input = Value;

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Waits for its siblings"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn display_in_output(&self) -> bool {
        false
    }

    fn execute(
        &self,
        _input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let barrier = Arc::clone(&self.barrier);
        let fail = self.fail;
        async move {
            barrier.wait().await;
            if fail {
                Err(ToolError::execution_error().with_reason("out of order"))
            } else {
                Ok(format!("{} passed", ctx.call_id).into())
            }
        }
    }
}

/// Reports the conversation it was called from.
struct WhoAmITool {
    schema: Value,
}

impl Tool for WhoAmITool {
    type Input = Value;

    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "Returns the conversation id"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        _input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        std::future::ready(Ok(ctx.identity.conversation_id.into()))
    }
}

fn gate(name: &'static str, barrier: &Arc<Barrier>, fail: bool) -> GateTool {
    GateTool {
        name,
        barrier: Arc::clone(barrier),
        fail,
        schema: json!({}),
    }
}

fn tool_results(conversation: &Conversation) -> Vec<&ToolCallResult> {
    conversation
        .items()
        .iter()
        .filter_map(|item| match item.message() {
            ModelMessage::Tool(result) => Some(result),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_simple_message() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hi, ".to_owned()),
        PresetEvent::MessageDelta("what can I do for you?".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider).build();
    let mut conversation = Conversation::default();
    let progress = MemoryProgress::new();
    let turn = timeout(
        Duration::from_millis(500),
        agent.respond(&mut conversation, "Hello", &progress),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(turn.content.as_deref(), Some("Hi, what can I do for you?"));
    assert_eq!(progress.text(), "Hi, what can I do for you?");
    let transcripts: Vec<_> = conversation
        .items()
        .iter()
        .map(|item| item.transcript())
        .collect();
    assert_eq!(transcripts, ["Hello", "Hi, what can I do for you?"]);
}

#[tokio::test]
async fn test_calc_round_trip() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("c1", "calc", r#"{"expr":"2+2"}"#),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("The answer is 4.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_system_prompt("You are a calculator.")
        .with_tool(CalcTool::new())
        .build();
    let mut conversation =
        Conversation::new(RequestIdentity::new("key", "conv-1"));
    let progress = MemoryProgress::new();
    let turn = agent
        .respond(&mut conversation, "What is 2+2?", &progress)
        .await
        .unwrap();

    assert_eq!(turn.content.as_deref(), Some("The answer is 4."));
    assert_eq!(
        tool_results(&conversation),
        [&ToolCallResult {
            id: "c1".to_owned(),
            content: Some("4".to_owned()),
            attachments: vec![],
        }]
    );
    assert_eq!(conversation.items().len(), 4);

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[1].identity, RequestIdentity::new("key", "conv-1"));
    assert_eq!(
        requests[1].messages.first(),
        Some(&ModelMessage::System("You are a calculator.".to_owned()))
    );
    assert!(matches!(
        requests[1].messages.last(),
        Some(ModelMessage::Tool(result)) if result.id == "c1"
    ));

    let segments = progress.segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].label, "calc");
    assert!(segments[0].text.ends_with("## Response:\n\n4"));
    assert!(segments[0].closed);
}

#[tokio::test]
async fn test_tool_round_is_appended_once() {
    let barrier = Arc::new(Barrier::new(3));
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Running all three.".to_owned()),
        PresetEvent::tool_call("c1", "first", "{}"),
        PresetEvent::tool_call("c2", "second", ""),
        PresetEvent::tool_call("c3", "third", "{}"),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("All passed.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(gate("first", &barrier, false))
        .with_tool(gate("second", &barrier, false))
        .with_tool(gate("third", &barrier, false))
        .build();
    let mut conversation = Conversation::default();
    // The calls only get past the barrier if they all run at once.
    let turn = timeout(
        Duration::from_secs(5),
        agent.respond(&mut conversation, "Go", &NoopProgress),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(turn.content.as_deref(), Some("All passed."));

    // The follow-up request saw the whole round at once.
    let requests = model_provider.requests();
    let messages = &requests[1].messages;
    assert_eq!(messages.len(), 5);
    assert!(matches!(
        &messages[1],
        ModelMessage::Assistant(turn) if turn.tool_calls.len() == 3
    ));
    let ids: Vec<_> = messages[2..]
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => Some(result.id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, ["c1", "c2", "c3"]);
}

#[tokio::test]
async fn test_failed_call_aborts_round() {
    let barrier = Arc::new(Barrier::new(2));
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("c1", "good", "{}"),
        PresetEvent::tool_call("c2", "bad", "{}"),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Unreachable.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(gate("good", &barrier, false))
        .with_tool(gate("bad", &barrier, true))
        .build();
    let mut conversation = Conversation::default();
    let progress = MemoryProgress::new();
    let err = timeout(
        Duration::from_secs(5),
        agent.respond(&mut conversation, "Go", &progress),
    )
    .await
    .unwrap()
    .unwrap_err();

    let Error::ToolExecution { call_id, source } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(call_id, "c2");
    assert_eq!(source.kind(), ErrorKind::ExecutionError);

    // Only the user input made it into the history.
    assert_eq!(conversation.items().len(), 1);
    assert!(matches!(
        conversation.items()[0].message(),
        ModelMessage::User(input) if input == "Go"
    ));
    assert_eq!(model_provider.requests().len(), 1);
    assert!(progress.segments().iter().all(|segment| segment.closed));
}

#[tokio::test]
async fn test_failed_call_reported_to_model() {
    let barrier = Arc::new(Barrier::new(2));
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("c1", "good", "{}"),
        PresetEvent::tool_call("c2", "bad", "{}"),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("One of them failed.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(gate("good", &barrier, false))
        .with_tool(gate("bad", &barrier, true))
        .with_failure_policy(ToolFailurePolicy::ReportToModel)
        .build();
    let mut conversation = Conversation::default();
    let turn = agent
        .respond(&mut conversation, "Go", &NoopProgress)
        .await
        .unwrap();
    assert_eq!(turn.content.as_deref(), Some("One of them failed."));

    let results = tool_results(&conversation);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content.as_deref(), Some("c1 passed"));
    assert_eq!(results[1].id, "c2");
    let content = results[1].content.as_deref().unwrap();
    assert!(content.starts_with("Error: "));
    assert!(content.contains("out of order"));
}

#[tokio::test]
async fn test_unknown_tool() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("c1", "launch_rocket", "{}"),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider).build();
    let mut conversation = Conversation::default();
    let err = agent
        .respond(&mut conversation, "Go", &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::UnknownTool { call_id, name }
            if call_id == "c1" && name == "launch_rocket"
    ));
    assert_eq!(conversation.items().len(), 1);
}

#[tokio::test]
async fn test_turn_limit() {
    let mut model_provider = TestModelProvider::default();
    for idx in 0..3 {
        model_provider.add_assistant_response_step(
            PresetResponse::with_events([PresetEvent::tool_call(
                format!("c{idx}"),
                "whoami",
                "{}",
            )]),
        );
    }

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(WhoAmITool { schema: json!({}) })
        .with_max_turns(2)
        .build();
    let mut conversation = Conversation::default();
    let err = agent
        .respond(&mut conversation, "Loop forever", &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TurnLimitExceeded(2)));
    assert_eq!(model_provider.requests().len(), 2);
    // Completed rounds stay in the history, the calls of the last turn
    // never run.
    assert_eq!(tool_results(&conversation).len(), 1);
}

#[tokio::test]
async fn test_last_turn_does_not_run_tools() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("c1", "calc", r#"{"expr":"1+2"}"#),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(CalcTool::new())
        .with_max_turns(1)
        .build();
    let mut conversation = Conversation::default();
    let progress = MemoryProgress::new();
    let err = agent
        .respond(&mut conversation, "What is 1+2?", &progress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TurnLimitExceeded(1)));
    assert_eq!(model_provider.requests().len(), 1);
    assert!(progress.segments().is_empty());
    assert_eq!(conversation.items().len(), 1);
    assert!(matches!(
        conversation.items()[0].message(),
        ModelMessage::User(_)
    ));
}

#[tokio::test]
async fn test_malformed_stream_discards_the_turn() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Let me check".to_owned()),
        PresetEvent::ToolCallDelta(ToolCallDelta::arguments(0, "{\"expr\":")),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(CalcTool::new())
        .build();
    let mut conversation = Conversation::default();
    let progress = MemoryProgress::new();
    let err = agent
        .respond(&mut conversation, "What is 1+2?", &progress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    // Only the user input is recorded, the streamed text stays visible.
    assert_eq!(conversation.items().len(), 1);
    assert!(tool_results(&conversation).is_empty());
    assert_eq!(progress.text(), "Let me check");
    assert!(progress.segments().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_model_timeout() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_secs(30));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Too late.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_model_timeout(Duration::from_secs(5))
        .build();
    let mut conversation = Conversation::default();
    let err = agent
        .respond(&mut conversation, "Hi", &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Timeout(deadline) if deadline == Duration::from_secs(5)
    ));
}

#[tokio::test]
async fn test_model_retry() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(
        PresetResponse::with_events([PresetEvent::MessageDelta(
            "Back online.".to_owned(),
        )])
        .with_failures(1),
    );

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_retry_policy(RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed_time: Duration::from_secs(5),
        })
        .build();
    let mut conversation = Conversation::default();
    let turn = agent
        .respond(&mut conversation, "Hi", &NoopProgress)
        .await
        .unwrap();
    assert_eq!(turn.content.as_deref(), Some("Back online."));
    assert_eq!(model_provider.requests().len(), 2);
}

#[tokio::test]
async fn test_conversations_are_isolated() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("c1", "whoami", ""),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Done.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(WhoAmITool { schema: json!({}) })
        .build();
    let mut alice = Conversation::new(RequestIdentity::new("", "alice"));
    let mut bob = Conversation::new(RequestIdentity::new("", "bob"));
    let (alice_turn, bob_turn) = tokio::join!(
        agent.respond(&mut alice, "Who am I?", &NoopProgress),
        agent.respond(&mut bob, "Who am I?", &NoopProgress),
    );
    alice_turn.unwrap();
    bob_turn.unwrap();

    assert_eq!(alice.items().len(), 4);
    assert_eq!(bob.items().len(), 4);
    assert_eq!(tool_results(&alice)[0].content.as_deref(), Some("alice"));
    assert_eq!(tool_results(&bob)[0].content.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_follow_up_sees_previous_answer() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("First.".to_owned()),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("Second.".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider).build();
    let mut conversation = Conversation::default();
    agent
        .respond(&mut conversation, "One", &NoopProgress)
        .await
        .unwrap();
    let turn = agent
        .respond(&mut conversation, "Two", &NoopProgress)
        .await
        .unwrap();
    assert_eq!(turn.content.as_deref(), Some("Second."));
    assert_eq!(conversation.items().len(), 4);
}
