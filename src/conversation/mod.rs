//! Conversation history: an append-only message log with the system prompt pinned first.

use crate::error::{HalError, Result};
use crate::types::{Message, Role};

/// Ordered message history for one conversation.
///
/// Index 0 is always the system prompt. Messages are only ever appended;
/// nothing is edited or removed once recorded.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Append a message, enforcing the role invariants of the history.
    ///
    /// A second system message is rejected, as is a tool result whose
    /// `tool_call_id` was not requested by the assistant message that opened
    /// the current run of tool results.
    pub fn append(&mut self, message: Message) -> Result<()> {
        match &message {
            Message::System { .. } => {
                return Err(HalError::InvalidState(
                    "system prompt is fixed at conversation creation".into(),
                ));
            }
            Message::Tool { tool_call_id, .. } => {
                if !self.pending_call_ids().any(|id| id == tool_call_id) {
                    return Err(HalError::InvalidState(format!(
                        "tool result '{tool_call_id}' does not answer a pending tool call"
                    )));
                }
            }
            Message::User { .. } | Message::Assistant { .. } => {}
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Pairs with [`len`](Self::len). Always false, since the system prompt is never removed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_prompt(&self) -> &str {
        self.messages[0].content()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Call ids of the nearest assistant message, provided only tool results follow it.
    fn pending_call_ids(&self) -> impl Iterator<Item = &str> {
        let opener = self
            .messages
            .iter()
            .rev()
            .find(|message| message.role() != Role::Tool)
            .filter(|message| message.role() == Role::Assistant);

        opener
            .into_iter()
            .flat_map(|message| message.tool_calls().iter().map(|call| call.id.as_str()))
    }
}
