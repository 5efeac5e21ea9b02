use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use swaig_agent::tools::{ToolError, ToolRegistry};
use swaig_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use swaig_core::{DataMapError, DataMapInterpreter, ReqwestTransport};
use tracing::{debug, info};

use super::{load_document, CommandResult};

const COMMAND: &str = "exec";

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub file: PathBuf,
    pub function: String,
    pub args: Option<String>,
    pub timeout_secs: Option<u64>,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ExecOutcome<'a> {
    command: &'static str,
    status: &'static str,
    function: &'a str,
    result: Value,
}

pub fn run(options: ExecOptions) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: options.config_path.clone(),
        overrides: ConfigOverrides {
            http_timeout_secs: options.timeout_secs,
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("failed to load configuration: {error}"),
                2,
            );
        }
    };

    let document = match load_document(&options.file) {
        Ok(document) => document,
        Err(message) => return CommandResult::failure(COMMAND, "definitions_load", message, 2),
    };

    let args = match parse_args(options.args.as_deref()) {
        Ok(args) => args,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_arguments", message, 2),
    };

    let transport = match ReqwestTransport::new(&config.http.user_agent) {
        Ok(transport) => transport,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "transport_init",
                format!("failed to build HTTP client: {error}"),
                2,
            );
        }
    };
    let interpreter =
        DataMapInterpreter::with_settings(Arc::new(transport), config.interpreter_settings());

    let (registry, report) = ToolRegistry::from_definitions(&document, &interpreter);
    debug!(
        event_name = "cli.exec.definitions_loaded",
        registered = report.registered.len(),
        skipped = report.skipped.len(),
        "loaded function definitions"
    );

    if registry.get(&options.function).is_none() {
        let message = match report.skipped.iter().find(|skipped| skipped.function == options.function)
        {
            Some(skipped) => {
                format!("function `{}` was not loaded: {}", options.function, skipped.reason)
            }
            None => format!(
                "function `{}` not found in `{}` (available: {})",
                options.function,
                options.file.display(),
                render_names(&registry.names())
            ),
        };
        return CommandResult::failure(COMMAND, "unknown_function", message, 3);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                4,
            );
        }
    };

    info!(
        event_name = "cli.exec.started",
        function = %options.function,
        timeout_secs = config.http.timeout_secs,
        "executing function"
    );
    match runtime.block_on(registry.dispatch(&options.function, args)) {
        Ok(result) => CommandResult::report(
            0,
            &ExecOutcome { command: COMMAND, status: "ok", function: &options.function, result },
        ),
        Err(error) => {
            let error_class = if let Some(datamap_error) = error.downcast_ref::<DataMapError>() {
                datamap_error.error_class()
            } else if let Some(ToolError::InvalidArguments { .. }) = error.downcast_ref::<ToolError>()
            {
                "invalid_arguments"
            } else {
                "execution"
            };
            CommandResult::failure(COMMAND, error_class, error.to_string(), 4)
        }
    }
}

fn parse_args(raw: Option<&str>) -> Result<Value, String> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty()).unwrap_or("{}");
    let value: Value = serde_json::from_str(raw)
        .map_err(|error| format!("--args is not valid JSON: {error}"))?;
    if !value.is_object() {
        return Err("--args must be a JSON object".to_string());
    }
    Ok(value)
}

fn render_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
