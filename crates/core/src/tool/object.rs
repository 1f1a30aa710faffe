use std::pin::Pin;

use serde_json::{Map, Value};
use tracing::Instrument;

use super::{Error, Tool, ToolContext, ToolResult};

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn display_in_output(&self) -> bool;

    fn execute(
        &self,
        arguments: &str,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    #[inline]
    fn display_in_output(&self) -> bool {
        self.0.display_in_output()
    }

    fn execute(
        &self,
        arguments: &str,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let input: T::Input = match parse_arguments(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };

        let span = debug_span!(
            "tool execute",
            tool = self.0.name(),
            call_id = %ctx.call_id
        );
        Box::pin(self.0.execute(input, ctx).instrument(span))
    }
}

/// Parses raw call arguments, where an empty string means no arguments.
fn parse_arguments<I: serde::de::DeserializeOwned>(
    arguments: &str,
) -> serde_json::Result<I> {
    if arguments.trim().is_empty() {
        return serde_json::from_value(Value::Object(Map::new()));
    }
    serde_json::from_str(arguments)
}
