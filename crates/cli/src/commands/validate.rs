use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use swaig_agent::tools::{definition_name, function_definitions};
use swaig_core::{DataMapConfig, HttpMethod};

use super::{load_document, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct ValidationCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct FunctionReport {
    function: String,
    status: CheckStatus,
    checks: Vec<ValidationCheck>,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    overall_status: CheckStatus,
    summary: String,
    functions: Vec<FunctionReport>,
}

pub fn run(file: &Path, json_output: bool) -> CommandResult {
    let document = match load_document(file) {
        Ok(document) => document,
        Err(message) => return CommandResult::failure("validate", "definitions_load", message, 2),
    };

    let report = build_report(&document);
    let exit_code = if report.overall_status == CheckStatus::Fail { 5 } else { 0 };

    if json_output {
        return CommandResult::report(exit_code, &report);
    }
    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(document: &Value) -> ValidationReport {
    let functions: Vec<FunctionReport> =
        function_definitions(document).into_iter().map(validate_definition).collect();

    let failed = functions.iter().filter(|function| function.status == CheckStatus::Fail).count();
    let overall_status =
        if failed == 0 && !functions.is_empty() { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if functions.is_empty() {
        "validate: no function definitions found".to_string()
    } else if failed == 0 {
        format!("validate: all {} definitions passed", functions.len())
    } else {
        format!("validate: {failed} of {} definitions failed", functions.len())
    };

    ValidationReport { overall_status, summary, functions }
}

fn validate_definition(definition: &Value) -> FunctionReport {
    let function = definition_name(definition).unwrap_or("<unnamed>").to_string();
    let mut checks = vec![check_name(definition)];

    if definition.get("data_map").is_none() {
        checks.push(ValidationCheck {
            name: "data_map",
            status: CheckStatus::Skipped,
            details: "no data_map; the function is served by the agent's own webhook".to_string(),
        });
        return finish(function, checks);
    }

    match DataMapConfig::from_value(definition) {
        Ok(config) => {
            checks.push(ValidationCheck {
                name: "data_map",
                status: CheckStatus::Pass,
                details: "data_map deserialized".to_string(),
            });
            checks.push(check_methods(&config));
            checks.push(check_behavior(&config));
        }
        Err(error) => {
            checks.push(ValidationCheck {
                name: "data_map",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["webhook_methods", "has_behavior"] {
                checks.push(ValidationCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because data_map did not deserialize".to_string(),
                });
            }
        }
    }

    finish(function, checks)
}

fn finish(function: String, checks: Vec<ValidationCheck>) -> FunctionReport {
    let status = if checks.iter().any(|check| check.status == CheckStatus::Fail) {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    };
    FunctionReport { function, status, checks }
}

fn check_name(definition: &Value) -> ValidationCheck {
    match definition_name(definition).map(str::trim) {
        Some(name) if !name.is_empty() => ValidationCheck {
            name: "function_name",
            status: CheckStatus::Pass,
            details: format!("`{name}`"),
        },
        _ => ValidationCheck {
            name: "function_name",
            status: CheckStatus::Fail,
            details: "definition has no `function` name".to_string(),
        },
    }
}

fn check_methods(config: &DataMapConfig) -> ValidationCheck {
    let unsupported: Vec<String> = config
        .data_map
        .webhooks()
        .iter()
        .enumerate()
        .filter(|(_, webhook)| HttpMethod::parse(webhook.method()).is_none())
        .map(|(index, webhook)| format!("webhook {index} uses `{}`", webhook.method()))
        .collect();

    if unsupported.is_empty() {
        ValidationCheck {
            name: "webhook_methods",
            status: CheckStatus::Pass,
            details: format!("{} webhooks use supported methods", config.data_map.webhooks().len()),
        }
    } else {
        ValidationCheck {
            name: "webhook_methods",
            status: CheckStatus::Fail,
            details: format!(
                "{} (expected GET|POST|PUT|PATCH|DELETE)",
                unsupported.join("; ")
            ),
        }
    }
}

fn check_behavior(config: &DataMapConfig) -> ValidationCheck {
    let body = &config.data_map;
    if body.webhooks().is_empty() && body.expressions().is_empty() && body.output.is_none() {
        return ValidationCheck {
            name: "has_behavior",
            status: CheckStatus::Fail,
            details: "data_map has no webhooks, expressions, or output".to_string(),
        };
    }

    ValidationCheck {
        name: "has_behavior",
        status: CheckStatus::Pass,
        details: format!(
            "{} expressions, {} webhooks, fallback output {}",
            body.expressions().len(),
            body.webhooks().len(),
            if body.output.is_some() { "set" } else { "unset" }
        ),
    }
}

fn render_human(report: &ValidationReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for function in &report.functions {
        lines.push(format!("{}:", function.function));
        for check in &function.checks {
            let marker = match check.status {
                CheckStatus::Pass => "ok",
                CheckStatus::Fail => "fail",
                CheckStatus::Skipped => "skip",
            };
            lines.push(format!("  - [{marker}] {}: {}", check.name, check.details));
        }
    }

    lines.join("\n")
}
