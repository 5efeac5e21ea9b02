use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DataMapError;
use crate::template::{expand, expand_value};

pub const DEFAULT_METHOD: &str = "POST";
pub const DEFAULT_FOREACH_INPUT_KEY: &str = "data";
pub const DEFAULT_FOREACH_OUTPUT_KEY: &str = "result";
pub const DEFAULT_FOREACH_MAX: usize = 100;
pub const DEFAULT_FOREACH_APPEND: &str = "${this.value}";

/// A DataMap function: its name plus the declarative body the platform runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataMapConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub data_map: DataMapBody,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataMapBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressions: Option<Vec<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<Vec<Webhook>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Template>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub pattern: String,
    pub output: Template,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_keys: Option<ErrorKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<ForeachSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Template>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeachSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
}

/// `error_keys` accepts a single key or a list of keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorKeys {
    One(String),
    Many(Vec<String>),
}

/// Output template: one string, or a map whose string leaves are expanded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Template {
    Text(String),
    Fields(Map<String, Value>),
}

impl DataMapConfig {
    /// Accepts both `{function, data_map: {...}}` and a bare body.
    pub fn from_value(value: &Value) -> Result<Self, DataMapError> {
        let Some(document) = value.as_object() else {
            return Err(DataMapError::InvalidConfig(
                "expected a JSON object for the data_map document".to_string(),
            ));
        };

        if document.contains_key("data_map") {
            return Ok(serde_json::from_value(value.clone())?);
        }

        let function = document.get("function").and_then(Value::as_str).map(str::to_owned);
        let data_map = serde_json::from_value(value.clone())?;
        Ok(Self { function, data_map })
    }

    pub fn function_name(&self) -> &str {
        self.function.as_deref().unwrap_or("<anonymous>")
    }
}

impl DataMapBody {
    pub fn expressions(&self) -> &[Expression] {
        self.expressions.as_deref().unwrap_or_default()
    }

    pub fn webhooks(&self) -> &[Webhook] {
        self.webhooks.as_deref().unwrap_or_default()
    }
}

impl Webhook {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or(DEFAULT_METHOD)
    }

    pub fn error_keys(&self) -> &[String] {
        match &self.error_keys {
            Some(ErrorKeys::One(key)) => std::slice::from_ref(key),
            Some(ErrorKeys::Many(keys)) => keys,
            None => &[],
        }
    }
}

impl ForeachSpec {
    pub fn input_key(&self) -> &str {
        self.input_key.as_deref().unwrap_or(DEFAULT_FOREACH_INPUT_KEY)
    }

    pub fn output_key(&self) -> &str {
        self.output_key.as_deref().unwrap_or(DEFAULT_FOREACH_OUTPUT_KEY)
    }

    pub fn max(&self) -> usize {
        self.max.unwrap_or(DEFAULT_FOREACH_MAX)
    }

    pub fn append(&self) -> &str {
        self.append.as_deref().unwrap_or(DEFAULT_FOREACH_APPEND)
    }
}

impl Template {
    pub fn render(&self, context: &Value) -> Value {
        match self {
            Self::Text(text) => Value::String(expand(text, context)),
            Self::Fields(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), expand_value(value, context)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Map<String, Value>> for Template {
    fn from(value: Map<String, Value>) -> Self {
        Self::Fields(value)
    }
}

impl From<Value> for Template {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(fields) => Self::Fields(fields),
            other => Self::Text(other.to_string()),
        }
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
