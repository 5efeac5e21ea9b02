use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use swaig_core::{DataMapConfig, DataMapInterpreter};
use thiserror::Error;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("no function named `{0}` is registered")]
    NotFound(String),
    #[error("function `{function}` expects an object of arguments, got {kind}")]
    InvalidArguments { function: String, kind: &'static str },
    #[error("function definition has no `function` name")]
    MissingFunctionName,
}

/// A registered function whose behavior is entirely described by its `data_map`.
#[derive(Clone)]
pub struct DataMapTool {
    name: String,
    config: DataMapConfig,
    interpreter: DataMapInterpreter,
}

impl DataMapTool {
    pub fn new(config: DataMapConfig, interpreter: DataMapInterpreter) -> Result<Self, ToolError> {
        let name = config
            .function
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or(ToolError::MissingFunctionName)?;
        Ok(Self { name, config, interpreter })
    }

    pub fn config(&self) -> &DataMapConfig {
        &self.config
    }
}

#[async_trait]
impl Tool for DataMapTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args = arguments_map(&self.name, input)?;
        Ok(self.interpreter.execute_config(&self.config, &args).await?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub registered: Vec<String>,
    pub skipped: Vec<SkippedDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedDefinition {
    pub function: String,
    pub reason: String,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registers every `data_map` definition found in `document`.
    ///
    /// Definitions without a `data_map` (webhook functions served by the agent
    /// itself) and definitions that fail to parse are reported as skipped.
    pub fn from_definitions(
        document: &Value,
        interpreter: &DataMapInterpreter,
    ) -> (Self, LoadReport) {
        let mut registry = Self::default();
        let mut report = LoadReport::default();

        for definition in function_definitions(document) {
            let function = definition_name(definition).unwrap_or("<unnamed>").to_string();

            if definition.get("data_map").is_none() {
                report.skipped.push(SkippedDefinition {
                    function,
                    reason: "definition has no data_map".to_string(),
                });
                continue;
            }

            let tool = DataMapConfig::from_value(definition)
                .map_err(|error| error.to_string())
                .and_then(|config| {
                    DataMapTool::new(config, interpreter.clone()).map_err(|error| error.to_string())
                });
            match tool {
                Ok(tool) => {
                    report.registered.push(tool.name().to_string());
                    registry.register(tool);
                }
                Err(reason) => report.skipped.push(SkippedDefinition { function, reason }),
            }
        }

        (registry, report)
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(args).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Function definitions in a document: one definition, an array of them, or `{functions: [...]}`.
pub fn function_definitions(document: &Value) -> Vec<&Value> {
    match document {
        Value::Array(items) => items.iter().collect(),
        Value::Object(fields) => match fields.get("functions") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![document],
        },
        _ => Vec::new(),
    }
}

pub fn definition_name(definition: &Value) -> Option<&str> {
    definition.get("function").and_then(Value::as_str)
}

fn arguments_map(function: &str, input: Value) -> Result<Map<String, Value>, ToolError> {
    match input {
        Value::Object(args) => Ok(args),
        Value::Null => Ok(Map::new()),
        other => Err(ToolError::InvalidArguments {
            function: function.to_string(),
            kind: match other {
                Value::Bool(_) => "a boolean",
                Value::Number(_) => "a number",
                Value::String(_) => "a string",
                _ => "an array",
            },
        }),
    }
}
