//! Message types for model communication.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in a conversation.
///
/// The role is the variant, so fields that only make sense for one role
/// (`tool_calls` on assistant turns, `tool_call_id` on tool results) cannot
/// appear anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, deserialize_with = "null_as_default")]
        content: String,
        #[serde(
            default,
            deserialize_with = "null_as_default",
            skip_serializing_if = "Vec::is_empty"
        )]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    /// Create a plain assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message that requests tool execution.
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: text.into(),
            tool_calls,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Tool {
            content: text.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Tool calls requested by this message; empty for every non-assistant role.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

/// A tool call requested by the model.
///
/// Serialized in function-calling form so a gateway can forward history to
/// its model unchanged. Deserialization also accepts the flat
/// `{id, tool_name, arguments}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolCallRepr", into = "FunctionCallRepr")]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCallRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionRepr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionRepr {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct FlatCallRepr {
    #[serde(default)]
    id: Option<String>,
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ToolCallRepr {
    Flat(FlatCallRepr),
    Function(FunctionCallRepr),
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<ToolCallRepr> for ToolCall {
    fn from(repr: ToolCallRepr) -> Self {
        let (id, tool_name, arguments) = match repr {
            ToolCallRepr::Flat(flat) => (flat.id, flat.tool_name, flat.arguments),
            ToolCallRepr::Function(call) => (call.id, call.function.name, call.function.arguments),
        };
        Self {
            id: id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            tool_name,
            arguments: decode_string_arguments(arguments),
        }
    }
}

impl From<ToolCall> for FunctionCallRepr {
    fn from(call: ToolCall) -> Self {
        Self {
            id: Some(call.id),
            kind: function_kind(),
            function: FunctionRepr {
                name: call.tool_name,
                arguments: call.arguments,
            },
        }
    }
}

/// Some backends send arguments as a JSON-encoded string.
fn decode_string_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => {
            match serde_json::from_str::<serde_json::Value>(raw.trim()) {
                Ok(parsed @ serde_json::Value::Object(_)) => parsed,
                _ => serde_json::Value::String(raw),
            }
        }
        other => other,
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn role_tag_selects_variant() {
        let message: Message =
            serde_json::from_value(json!({"role": "tool", "content": "sunny", "tool_call_id": "7"}))
                .expect("tool message should parse");
        assert_eq!(message.role(), Role::Tool);
        assert_eq!(message.tool_call_id(), Some("7"));
        assert!(message.tool_calls().is_empty());
    }

    #[test]
    fn assistant_accepts_null_content_and_tool_calls() {
        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": null
        }))
        .expect("nulls should default");
        assert_eq!(message, Message::assistant(""));
    }

    #[test]
    fn tool_call_accepts_function_shape_with_string_arguments() {
        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{
                "function": { "name": "get_weather", "arguments": "{\"city\":\"Urbana\"}" }
            }]
        }))
        .expect("function-shaped call should parse");

        let call = &message.tool_calls()[0];
        assert_eq!(call.tool_name, "get_weather");
        assert_eq!(call.arguments, json!({"city": "Urbana"}));
        assert!(!call.id.is_empty(), "missing ids are generated");
    }

    #[test]
    fn tool_call_accepts_flat_shape() {
        let call: ToolCall =
            serde_json::from_value(json!({"id": "1", "tool_name": "echo", "arguments": {"x": "hi"}}))
                .expect("flat call should parse");
        assert_eq!(call, ToolCall::new("1", "echo", json!({"x": "hi"})));
    }

    #[test]
    fn tool_call_serializes_in_function_form() {
        let value = serde_json::to_value(ToolCall::new("1", "echo", json!({"x": "hi"})))
            .expect("call should serialize");
        assert_eq!(
            value,
            json!({
                "id": "1",
                "type": "function",
                "function": { "name": "echo", "arguments": {"x": "hi"} }
            })
        );
    }

    #[test]
    fn plain_assistant_omits_tool_calls_on_the_wire() {
        let value = serde_json::to_value(Message::assistant("Hello, Dave.")).expect("serialize");
        assert_eq!(value, json!({"role": "assistant", "content": "Hello, Dave."}));
    }

    #[test]
    fn unparseable_string_arguments_are_kept_verbatim() {
        assert_eq!(decode_string_arguments(json!("not json")), json!("not json"));
        assert_eq!(decode_string_arguments(json!("[1,2]")), json!("[1,2]"));
    }

    #[test]
    fn role_round_trips_through_strum() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!("tool".parse::<Role>().expect("known role"), Role::Tool);
    }
}
