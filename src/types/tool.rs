//! Tool descriptors exchanged with providers and the LLM gateway.

use serde::{Deserialize, Serialize};

/// A tool's callable contract.
///
/// On the wire a spec is written in function-calling form:
///
/// ```json
/// {"type": "function", "function": {"name": "...", "description": "...", "parameters": {...}}}
/// ```
///
/// Reading also accepts the flat `{name, description, input_schema}` shape
/// that tool providers advertise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolSpecRepr", into = "FunctionSpecRepr")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
        }
    }

    /// Spec whose arguments are an object with no declared properties.
    pub fn without_parameters(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, empty_object_schema())
    }
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionSpecRepr {
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionDefinition {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "empty_object_schema")]
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct FlatSpecRepr {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "empty_object_schema", alias = "inputSchema", alias = "parameters")]
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ToolSpecRepr {
    Function(FunctionSpecRepr),
    Flat(FlatSpecRepr),
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<ToolSpecRepr> for ToolSpec {
    fn from(repr: ToolSpecRepr) -> Self {
        match repr {
            ToolSpecRepr::Function(spec) => Self::new(
                spec.function.name,
                spec.function.description.unwrap_or_default(),
                spec.function.parameters,
            ),
            ToolSpecRepr::Flat(spec) => Self::new(
                spec.name,
                spec.description.unwrap_or_default(),
                spec.input_schema,
            ),
        }
    }
}

impl From<ToolSpec> for FunctionSpecRepr {
    fn from(spec: ToolSpec) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDefinition {
                name: spec.name,
                description: Some(spec.description),
                parameters: spec.parameter_schema,
            },
        }
    }
}
