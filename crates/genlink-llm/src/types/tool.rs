use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within a request
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter schema, either a full JSON Schema or a bare property map
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Schema of the tool's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Required parameter names, used when `parameters` is a bare property map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: Map::new(),
            output_schema: None,
            required: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the parameter schema; non-object values are ignored
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        if let Value::Object(map) = parameters {
            self.parameters = map;
        }
        self
    }

    #[must_use]
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }

    /// JSON Schema sent to providers
    ///
    /// A schema that already declares a `type` is used verbatim; a bare
    /// property map is wrapped into an object schema.
    pub fn input_schema(&self) -> Value {
        if self.parameters.contains_key("type") {
            return Value::Object(self.parameters.clone());
        }
        serde_json::json!({
            "type": "object",
            "properties": self.parameters,
            "required": self.required,
        })
    }
}

/// Tool selection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides
    Auto,
    /// Never call tools
    None,
    /// Must call at least one tool
    Required,
    /// Must call the named tool
    Function(String),
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id, echoed back by the tool result
    pub id: String,
    /// Tool name
    pub name: String,
    /// Decoded arguments
    pub arguments: Value,
    /// Arguments exactly as the provider sent them
    #[serde(default)]
    pub raw_arguments: String,
}

impl ToolCall {
    /// Build a call from the provider's raw argument text
    ///
    /// Empty text decodes to `{}`. Text that is not a JSON object is kept
    /// as `{"raw": <text>}` so the call stays visible to the caller.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        let raw_arguments = raw_arguments.into();
        Self {
            id: id.into(),
            name: name.into(),
            arguments: decode_arguments(&raw_arguments),
            raw_arguments,
        }
    }

    /// Identifier for a call the provider sent without one
    pub fn synthesized_id(choice: u32, position: u32) -> String {
        format!("call_{choice}_{position}")
    }

    /// Build a call from already-decoded arguments
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let raw_arguments = arguments.to_string();
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            raw_arguments,
        }
    }

    /// Argument text to send back to a provider
    pub fn arguments_text(&self) -> String {
        if self.raw_arguments.is_empty() {
            self.arguments.to_string()
        } else {
            self.raw_arguments.clone()
        }
    }
}

fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "raw": raw }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn typed_schema_is_verbatim() {
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "additionalProperties": false
        });
        let tool = ToolDefinition::new("weather").with_parameters(schema.clone());
        assert_eq!(tool.input_schema(), schema);
    }

    #[test]
    fn bare_properties_are_wrapped() {
        let tool = ToolDefinition::new("weather")
            .with_parameters(json!({"city": {"type": "string"}}))
            .with_required(vec!["city".to_owned()]);
        assert_eq!(
            tool.input_schema(),
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            })
        );
    }

    #[test]
    fn arguments_decode_or_wrap() {
        let ok = ToolCall::from_raw("call_1", "weather", r#"{"location":"NYC"}"#);
        assert_eq!(ok.arguments, json!({"location": "NYC"}));

        let empty = ToolCall::from_raw("call_2", "ping", "");
        assert_eq!(empty.arguments, json!({}));

        let broken = ToolCall::from_raw("call_3", "weather", r#"{"loc"#);
        assert_eq!(broken.arguments, json!({"raw": "{\"loc"}));
        assert_eq!(broken.raw_arguments, r#"{"loc"#);
    }

    #[test]
    fn tool_choice_serialization() {
        assert_eq!(serde_json::to_value(ToolChoice::Auto).unwrap(), json!({"type": "auto"}));
        assert_eq!(
            serde_json::to_value(ToolChoice::Function("weather".to_owned())).unwrap(),
            json!({"type": "function", "name": "weather"})
        );
    }
}
