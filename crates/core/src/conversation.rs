//! Conversation-related types.

use turnloop_model::{
    AssistantTurn, ModelMessage, RequestIdentity, ToolCallResult,
};

/// Represents a conversation.
///
/// A conversation is owned by the caller and lent to the agent for each
/// user turn, so one agent can serve many conversations at once.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    identity: RequestIdentity,
    pub(crate) items: Vec<Item>,
}

/// An item in the conversation.
#[derive(Clone, Debug)]
pub struct Item {
    pub(crate) msg: ModelMessage,
    pub(crate) transcript: String,
}

impl Conversation {
    /// Creates an empty conversation for the given identity.
    #[inline]
    pub fn new(identity: RequestIdentity) -> Self {
        Self {
            identity,
            items: vec![],
        }
    }

    /// Returns the identity every model and tool call is made with.
    #[inline]
    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Returns the items in chronological order.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub(crate) fn messages(&self) -> impl Iterator<Item = &ModelMessage> {
        self.items.iter().map(|item| &item.msg)
    }

    pub(crate) fn push_user_input(&mut self, input: String) {
        self.items.push(Item {
            transcript: input.clone(),
            msg: ModelMessage::User(input),
        });
    }

    pub(crate) fn push_assistant_turn(&mut self, turn: AssistantTurn) {
        self.items.push(Item {
            transcript: turn.content.clone().unwrap_or_default(),
            msg: ModelMessage::Assistant(turn),
        });
    }

    /// Appends a completed tool round: the turn that requested the calls
    /// followed by one result per call.
    pub(crate) fn push_tool_round(
        &mut self,
        turn: AssistantTurn,
        results: Vec<ToolCallResult>,
    ) {
        self.items.reserve(results.len() + 1);
        self.push_assistant_turn(turn);
        for result in results {
            self.items.push(Item {
                transcript: result.content.clone().unwrap_or_default(),
                msg: ModelMessage::Tool(result),
            });
        }
    }
}

impl Item {
    /// Returns the message of this item.
    #[inline]
    pub fn message(&self) -> &ModelMessage {
        &self.msg
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is a string representation of the message item,
    /// which can be exported later. But transcript alone is not enough
    /// to reconstruct the message item.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}
