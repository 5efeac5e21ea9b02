use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use swaig_agent::tools::{definition_name, function_definitions};

use super::{load_document, CommandResult};

#[derive(Debug, Serialize)]
struct FunctionSummary {
    function: String,
    description: Option<String>,
    datamap: bool,
    webhooks: usize,
    expressions: usize,
}

#[derive(Debug, Serialize)]
struct ListOutcome {
    command: &'static str,
    status: &'static str,
    functions: Vec<FunctionSummary>,
}

pub fn run(file: &Path) -> CommandResult {
    let document = match load_document(file) {
        Ok(document) => document,
        Err(message) => return CommandResult::failure("list", "definitions_load", message, 2),
    };

    let functions = function_definitions(&document).into_iter().map(summarize).collect();
    CommandResult::report(0, &ListOutcome { command: "list", status: "ok", functions })
}

fn summarize(definition: &Value) -> FunctionSummary {
    let data_map = definition.get("data_map");
    let count = |section: &str| {
        data_map.and_then(|body| body.get(section)).and_then(Value::as_array).map_or(0, Vec::len)
    };

    FunctionSummary {
        function: definition_name(definition).unwrap_or("<unnamed>").to_string(),
        description: definition.get("description").and_then(Value::as_str).map(str::to_string),
        datamap: data_map.is_some(),
        webhooks: count("webhooks"),
        expressions: count("expressions"),
    }
}
