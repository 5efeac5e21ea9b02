//! Fluent construction of DataMap functions.
//!
//! Webhook-scoped calls (`header`, `params`, `foreach`, ...) apply to the most
//! recently added webhook. Calling one before any `webhook` is recorded and
//! reported by [`DataMap::try_build`].

use serde_json::{json, Map, Value};

use crate::datamap::model::{
    DataMapBody, DataMapConfig, ErrorKeys, Expression, ForeachSpec, Template, Webhook,
};
use crate::errors::DataMapError;
use crate::transport::HttpMethod;

#[derive(Clone, Debug, Default)]
pub struct DataMap {
    function: String,
    description: Option<String>,
    properties: Map<String, Value>,
    required: Vec<String>,
    expressions: Vec<Expression>,
    webhooks: Vec<Webhook>,
    output: Option<Template>,
    errors: Vec<String>,
}

impl DataMap {
    pub fn new(function: impl Into<String>) -> Self {
        Self { function: function.into(), ..Self::default() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Alias for [`DataMap::description`].
    pub fn purpose(self, purpose: impl Into<String>) -> Self {
        self.description(purpose)
    }

    pub fn parameter(
        mut self,
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({"type": param_type.into(), "description": description.into()}),
        );
        if required && !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    pub fn expression(mut self, pattern: impl Into<String>, output: impl Into<Template>) -> Self {
        self.expressions.push(Expression { pattern: pattern.into(), output: output.into() });
        self
    }

    pub fn webhook(mut self, method: impl Into<String>, url: impl Into<String>) -> Self {
        self.webhooks.push(Webhook {
            url: url.into(),
            method: Some(method.into()),
            ..Webhook::default()
        });
        self
    }

    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), Value::String(value.into()));
        self.with_last_webhook("header", move |webhook| {
            webhook.headers.get_or_insert_with(Map::new).insert(name, value);
        })
    }

    pub fn params(self, params: Map<String, Value>) -> Self {
        self.with_last_webhook("params", move |webhook| webhook.params = Some(params))
    }

    pub fn body(self, body: Value) -> Self {
        self.with_last_webhook("body", move |webhook| webhook.body = Some(body))
    }

    pub fn data(self, data: Value) -> Self {
        self.with_last_webhook("data", move |webhook| webhook.data = Some(data))
    }

    pub fn error_keys<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.with_last_webhook("error_keys", move |webhook| {
            webhook.error_keys = Some(ErrorKeys::Many(keys));
        })
    }

    pub fn foreach(self, foreach: ForeachSpec) -> Self {
        self.with_last_webhook("foreach", move |webhook| webhook.foreach = Some(foreach))
    }

    pub fn webhook_output(self, output: impl Into<Template>) -> Self {
        let output = output.into();
        self.with_last_webhook("webhook_output", move |webhook| webhook.output = Some(output))
    }

    /// Body-level fallback output, rendered when every webhook fails.
    pub fn output(mut self, output: impl Into<Template>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn try_build(self) -> Result<DataMapConfig, DataMapError> {
        if self.function.trim().is_empty() {
            return Err(DataMapError::InvalidConfig("function name must not be empty".to_string()));
        }
        if let Some(error) = self.errors.first() {
            return Err(DataMapError::InvalidConfig(error.clone()));
        }
        if let Some(webhook) =
            self.webhooks.iter().find(|webhook| HttpMethod::parse(webhook.method()).is_none())
        {
            return Err(DataMapError::UnsupportedMethod {
                method: webhook.method().to_string(),
                url: webhook.url.clone(),
            });
        }

        Ok(DataMapConfig {
            function: Some(self.function),
            data_map: DataMapBody {
                expressions: (!self.expressions.is_empty()).then_some(self.expressions),
                webhooks: (!self.webhooks.is_empty()).then_some(self.webhooks),
                output: self.output,
            },
        })
    }

    /// SWAIG function definition: name, description, JSON-schema parameters and `data_map`.
    pub fn to_swaig_function(&self) -> Result<Value, DataMapError> {
        let description =
            self.description.clone().unwrap_or_else(|| format!("Execute {}", self.function));
        let mut parameters = json!({"type": "object", "properties": self.properties});
        if !self.required.is_empty() {
            parameters["required"] = json!(self.required);
        }

        let config = self.clone().try_build()?;
        let data_map = serde_json::to_value(&config.data_map)?;

        Ok(json!({
            "function": self.function,
            "description": description,
            "parameters": parameters,
            "data_map": data_map,
        }))
    }

    fn with_last_webhook(mut self, operation: &str, apply: impl FnOnce(&mut Webhook)) -> Self {
        match self.webhooks.last_mut() {
            Some(webhook) => apply(webhook),
            None => self.errors.push(format!("`{operation}` called before any webhook was added")),
        }
        self
    }
}
