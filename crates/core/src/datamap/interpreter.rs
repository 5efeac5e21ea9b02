//! Local evaluation of `data_map` documents.
//!
//! The pipeline runs in a fixed order: expressions, then webhooks one at a
//! time until one succeeds, then the body-level fallback output, then the
//! terminal failure value. Webhook failures never escape as errors; only an
//! unsupported HTTP method aborts the call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::datamap::model::{is_truthy, DataMapConfig, ForeachSpec, Webhook};
use crate::errors::DataMapError;
use crate::template::{expand, render_value, resolve_path};
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};

pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;
pub const ALL_WEBHOOKS_FAILED: &str = "All webhooks failed and no fallback output defined";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterpreterSettings {
    pub timeout: Duration,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS) }
    }
}

#[derive(Clone)]
pub struct DataMapInterpreter {
    transport: Arc<dyn HttpTransport>,
    settings: InterpreterSettings,
}

#[derive(Clone, Debug, PartialEq)]
enum FailureReason {
    Status(u16),
    ParseError,
    ProtocolError(String),
    ErrorKey(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "status {status} outside 200..=299"),
            Self::ParseError => f.write_str("response body is not JSON"),
            Self::ProtocolError(message) => write!(f, "protocol error: {message}"),
            Self::ErrorKey(key) => write!(f, "error key `{key}` present in response"),
        }
    }
}

#[derive(Debug)]
enum AttemptOutcome {
    Succeeded(Value),
    Failed(FailureReason),
}

/// How a successful webhook body is exposed to output templates.
#[derive(Clone, Copy, Debug)]
enum ResponseShape<'a> {
    Object(&'a Value),
    Array(&'a Value),
    Scalar,
}

impl<'a> ResponseShape<'a> {
    fn of(body: &'a Value) -> Self {
        match body {
            Value::Object(_) => Self::Object(body),
            Value::Array(_) => Self::Array(body),
            _ => Self::Scalar,
        }
    }
}

impl DataMapInterpreter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_settings(transport, InterpreterSettings::default())
    }

    pub fn with_settings(transport: Arc<dyn HttpTransport>, settings: InterpreterSettings) -> Self {
        Self { transport, settings }
    }

    pub fn settings(&self) -> &InterpreterSettings {
        &self.settings
    }

    /// Executes a raw `data_map` document (wrapped or bare) with the given arguments.
    pub async fn execute(
        &self,
        config: &Value,
        args: &Map<String, Value>,
    ) -> Result<Value, DataMapError> {
        let config = DataMapConfig::from_value(config)?;
        self.execute_config(&config, args).await
    }

    pub async fn execute_config(
        &self,
        config: &DataMapConfig,
        args: &Map<String, Value>,
    ) -> Result<Value, DataMapError> {
        let correlation_id = Uuid::new_v4().to_string();
        let span = tracing::debug_span!(
            "datamap.execute",
            function = config.function_name(),
            correlation_id = %correlation_id,
        );
        self.run_pipeline(config, args).instrument(span).await
    }

    async fn run_pipeline(
        &self,
        config: &DataMapConfig,
        args: &Map<String, Value>,
    ) -> Result<Value, DataMapError> {
        let body = &config.data_map;
        let context = base_context(args);

        let haystack = args_text(args);
        for (index, expression) in body.expressions().iter().enumerate() {
            if haystack.contains(&expression.pattern) {
                debug!(
                    event_name = "datamap.expression.matched",
                    expression_index = index,
                    pattern = %expression.pattern,
                    "expression matched, skipping webhooks"
                );
                return Ok(expression.output.render(&context));
            }
        }

        for (index, webhook) in body.webhooks().iter().enumerate() {
            match self.attempt_webhook(webhook, &context).await? {
                AttemptOutcome::Succeeded(result) => {
                    debug!(
                        event_name = "datamap.webhook.succeeded",
                        webhook_index = index,
                        "webhook succeeded"
                    );
                    return Ok(result);
                }
                AttemptOutcome::Failed(reason) => {
                    warn!(
                        event_name = "datamap.webhook.failed",
                        webhook_index = index,
                        reason = %reason,
                        "webhook failed, trying next"
                    );
                }
            }
        }

        if let Some(output) = &body.output {
            debug!(event_name = "datamap.fallback.rendered", "rendering fallback output");
            return Ok(output.render(&context));
        }

        warn!(event_name = "datamap.fallback.missing", "all webhooks failed without fallback");
        Ok(json!({"error": ALL_WEBHOOKS_FAILED, "status": "failed"}))
    }

    async fn attempt_webhook(
        &self,
        webhook: &Webhook,
        context: &Value,
    ) -> Result<AttemptOutcome, DataMapError> {
        let url = expand(&webhook.url, context);
        let Some(method) = HttpMethod::parse(webhook.method()) else {
            return Err(DataMapError::UnsupportedMethod {
                method: webhook.method().to_string(),
                url,
            });
        };

        let mut headers: Vec<(String, String)> = webhook
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), expand_scalar(value, context)))
            .collect();

        let payload = if method.carries_payload() { build_payload(webhook, context) } else { None };
        let body = payload.map(|payload| {
            let has_content_type =
                headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if payload.json_encoded && !has_content_type {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
            }
            payload.body
        });

        debug!(
            event_name = "datamap.webhook.request",
            method = %method,
            url = %url,
            has_body = body.is_some(),
            "sending webhook request"
        );

        let request = HttpRequest { method, url, headers, body, timeout: self.settings.timeout };
        let (status, parsed) = match self.transport.send(request).await {
            Ok(response) => {
                let parsed = serde_json::from_str::<Value>(&response.body).unwrap_or_else(|_| {
                    json!({
                        "text": response.body,
                        "status_code": response.status,
                        "parse_error": true,
                        "raw_response": response.body,
                    })
                });
                (Some(response.status), parsed)
            }
            Err(error) => (None, json!({"protocol_error": true, "error": error.to_string()})),
        };

        if let Some(reason) = classify_failure(status, &parsed, webhook.error_keys()) {
            return Ok(AttemptOutcome::Failed(reason));
        }

        Ok(AttemptOutcome::Succeeded(render_success(webhook, context, parsed)))
    }
}

/// `{args: args, **args}`: a flattened argument named `args` replaces the named entry.
fn base_context(args: &Map<String, Value>) -> Value {
    let mut context = Map::new();
    context.insert("args".to_string(), Value::Object(args.clone()));
    for (key, value) in args {
        context.insert(key.clone(), value.clone());
    }
    Value::Object(context)
}

/// The args map as the platform stringifies it for expression matching:
/// `{'name': 'Ann', 'vip': True, 'note': None}`.
fn args_text(args: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_platform_text(&mut out, &Value::Object(args.clone()));
    out
}

fn write_platform_text(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_quoted(out, text),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_platform_text(out, item);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            out.push('{');
            for (index, (key, item)) in fields.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(": ");
                write_platform_text(out, item);
            }
            out.push('}');
        }
    }
}

/// Single quotes unless the text holds a `'` and no `"`.
fn write_quoted(out: &mut String, text: &str) {
    let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            ch if (ch as u32) < 0x20 || ch as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", ch as u32));
            }
            ch => out.push(ch),
        }
    }
    out.push(quote);
}

struct Payload {
    body: String,
    json_encoded: bool,
}

fn build_payload(webhook: &Webhook, context: &Value) -> Option<Payload> {
    if let Some(params) = &webhook.params {
        let expanded: Map<String, Value> = params
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(expand_scalar(value, context))))
            .collect();
        return Some(Payload { body: Value::Object(expanded).to_string(), json_encoded: true });
    }

    if let Some(body) = &webhook.body {
        return Some(match body {
            Value::String(text) => Payload { body: expand(text, context), json_encoded: false },
            Value::Object(fields) => {
                let expanded: Map<String, Value> = fields
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(expand_scalar(value, context))))
                    .collect();
                Payload { body: Value::Object(expanded).to_string(), json_encoded: true }
            }
            other => Payload { body: other.to_string(), json_encoded: true },
        });
    }

    webhook.data.as_ref().map(|data| match data {
        Value::String(text) => Payload { body: text.clone(), json_encoded: false },
        other => Payload { body: other.to_string(), json_encoded: true },
    })
}

/// Expands a string value; other scalars use their default text form.
fn expand_scalar(value: &Value, context: &Value) -> String {
    match value {
        Value::String(text) => expand(text, context),
        other => render_value(other),
    }
}

fn classify_failure(
    status: Option<u16>,
    parsed: &Value,
    error_keys: &[String],
) -> Option<FailureReason> {
    if let Some(status) = status {
        if !(200..=299).contains(&status) {
            return Some(FailureReason::Status(status));
        }
    }

    if parsed.get("parse_error").is_some_and(is_truthy) {
        return Some(FailureReason::ParseError);
    }

    if parsed.get("protocol_error").is_some_and(is_truthy) {
        let message = parsed.get("error").map(render_value).unwrap_or_default();
        return Some(FailureReason::ProtocolError(message));
    }

    error_keys
        .iter()
        .find(|key| parsed.get(key.as_str()).is_some_and(is_truthy))
        .map(|key| FailureReason::ErrorKey(key.clone()))
}

fn render_success(webhook: &Webhook, base: &Value, parsed: Value) -> Value {
    let shape = ResponseShape::of(&parsed);

    let mut context = base.as_object().cloned().unwrap_or_default();
    match shape {
        ResponseShape::Object(body) => {
            context.insert("response".to_string(), body.clone());
        }
        ResponseShape::Array(body) => {
            context.insert("array".to_string(), body.clone());
        }
        ResponseShape::Scalar => {}
    }

    if let (Some(foreach), ResponseShape::Object(body)) = (&webhook.foreach, shape) {
        match aggregate_foreach(foreach, body) {
            Some(aggregated) => {
                context.insert(foreach.output_key().to_string(), Value::String(aggregated));
            }
            None => debug!(
                event_name = "datamap.foreach.skipped",
                input_key = foreach.input_key(),
                "foreach input missing or not an array"
            ),
        }
    }

    match &webhook.output {
        Some(output) => output.render(&Value::Object(context)),
        None => parsed,
    }
}

fn aggregate_foreach(spec: &ForeachSpec, response: &Value) -> Option<String> {
    let input_key = spec.input_key();
    let items = response
        .get(input_key)
        .or_else(|| resolve_path(response, input_key))?
        .as_array()?;
    let aggregated = items
        .iter()
        .take(spec.max())
        .map(|item| {
            let this = if item.is_object() { item.clone() } else { json!({"value": item}) };
            expand(spec.append(), &json!({"this": this}))
        })
        .collect();
    Some(aggregated)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use super::{aggregate_foreach, DataMapInterpreter, ALL_WEBHOOKS_FAILED};
    use crate::datamap::model::ForeachSpec;
    use crate::errors::{DataMapError, TransportError};
    use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn with_replies(replies: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), requests: Mutex::default() })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            self.replies
                .lock()
                .ok()
                .and_then(|mut replies| replies.pop_front())
                .unwrap_or_else(|| Err(TransportError::Request("no scripted reply".to_string())))
        }
    }

    fn ok(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(status, body.to_string()))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn interpreter(transport: &Arc<ScriptedTransport>) -> DataMapInterpreter {
        DataMapInterpreter::new(transport.clone())
    }

    #[tokio::test]
    async fn expression_match_short_circuits_webhooks() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({"x": 1}))]);
        let config = json!({
            "function": "lookup",
            "data_map": {
                "expressions": [{"pattern": "test", "output": {"response": "matched ${args.q}"}}],
                "webhooks": [{"url": "https://a.example"}, {"url": "https://b.example"}]
            }
        });

        let result = interpreter(&transport).execute(&config, &args(json!({"q": "test"}))).await?;

        assert_eq!(result, json!({"response": "matched test"}));
        assert!(transport.requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn expression_pattern_matches_anywhere_in_serialized_args() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![]);
        let config = json!({
            "expressions": [{"pattern": "5", "output": "five-ish"}],
            "output": "fallback"
        });

        // "5" appears only inside an unrelated numeric value, yet it still matches.
        let result =
            interpreter(&transport).execute(&config, &args(json!({"zip": 90510, "q": "x"}))).await?;

        assert_eq!(result, json!("five-ish"));
        Ok(())
    }

    #[tokio::test]
    async fn first_matching_expression_wins() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![]);
        let config = json!({
            "expressions": [
                {"pattern": "nomatch", "output": "first"},
                {"pattern": "blue", "output": "second"},
                {"pattern": "blue", "output": "third"}
            ]
        });

        let result =
            interpreter(&transport).execute(&config, &args(json!({"color": "blue"}))).await?;
        assert_eq!(result, json!("second"));
        Ok(())
    }

    #[tokio::test]
    async fn failing_webhook_falls_through_to_next() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![
            ok(500, json!({"ignored": true})),
            ok(200, json!({"temp": 72})),
        ]);
        let config = json!({
            "data_map": {
                "webhooks": [
                    {"url": "https://primary.example", "output": "primary ${response.ignored}"},
                    {"url": "https://backup.example", "output": {"response": "It is ${response.temp}F"}}
                ]
            }
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;

        assert_eq!(result, json!({"response": "It is 72F"}));
        let urls: Vec<String> =
            transport.requests().into_iter().map(|request| request.url).collect();
        assert_eq!(urls, vec!["https://primary.example", "https://backup.example"]);
        Ok(())
    }

    #[tokio::test]
    async fn status_boundaries_are_inclusive_of_2xx_only() -> Result<(), DataMapError> {
        for (status, succeeds) in [(199, false), (200, true), (299, true), (300, false)] {
            let transport = ScriptedTransport::with_replies(vec![ok(status, json!({"ok": 1}))]);
            let config = json!({
                "webhooks": [{"url": "https://a.example", "output": "success"}],
                "output": "fallback"
            });

            let result = interpreter(&transport).execute(&config, &Map::new()).await?;
            let expected = if succeeds { "success" } else { "fallback" };
            assert_eq!(result, json!(expected), "status {status}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn all_failures_render_fallback_against_args() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![
            ok(404, json!({"name": "from-response"})),
            Err(TransportError::Timeout("30s".to_string())),
        ]);
        let config = json!({
            "data_map": {
                "webhooks": [{"url": "https://a.example"}, {"url": "https://b.example"}],
                "output": {"msg": "${args.name} not found", "leak": "${response.name}"}
            }
        });

        let result = interpreter(&transport).execute(&config, &args(json!({"name": "Bob"}))).await?;

        assert_eq!(result, json!({"msg": "Bob not found", "leak": "<MISSING:response.name>"}));
        Ok(())
    }

    #[tokio::test]
    async fn all_failures_without_fallback_return_error_value() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(503, json!({}))]);
        let config = json!({"webhooks": [{"url": "https://a.example"}]});

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;

        assert_eq!(result, json!({"error": ALL_WEBHOOKS_FAILED, "status": "failed"}));
        assert_eq!(
            result,
            json!({"error": "All webhooks failed and no fallback output defined", "status": "failed"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_document_returns_error_value() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![]);
        let result = interpreter(&transport).execute(&json!({}), &Map::new()).await?;
        assert_eq!(result["status"], "failed");
        Ok(())
    }

    #[tokio::test]
    async fn declared_error_key_fails_a_2xx_response() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({"retry": true}))]);
        let config = json!({
            "webhooks": [{"url": "https://a.example", "error_keys": "retry", "output": "success"}],
            "output": "fallback"
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!("fallback"));
        Ok(())
    }

    #[tokio::test]
    async fn falsy_error_key_does_not_fail() -> Result<(), DataMapError> {
        let transport =
            ScriptedTransport::with_replies(vec![ok(200, json!({"error": "", "value": 3}))]);
        let config = json!({
            "webhooks": [{"url": "https://a.example", "error_keys": ["error"], "output": "v=${response.value}"}],
            "output": "fallback"
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!("v=3"));
        Ok(())
    }

    #[tokio::test]
    async fn non_json_body_is_a_parse_failure() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![
            Ok(HttpResponse::new(200, "<html>oops</html>")),
            ok(200, json!({"v": "second"})),
        ]);
        let config = json!({
            "webhooks": [
                {"url": "https://a.example", "output": "first"},
                {"url": "https://b.example", "output": "${response.v}"}
            ]
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!("second"));
        Ok(())
    }

    #[tokio::test]
    async fn transport_error_falls_through() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![
            Err(TransportError::Connect("refused".to_string())),
            ok(200, json!({"v": 1})),
        ]);
        let config = json!({
            "webhooks": [{"url": "https://down.example"}, {"url": "https://up.example"}]
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!({"v": 1}));
        Ok(())
    }

    #[tokio::test]
    async fn response_flagged_as_protocol_error_fails() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(
            200,
            json!({"protocol_error": true, "error": "upstream"}),
        )]);
        let config = json!({"webhooks": [{"url": "https://a.example"}], "output": "fallback"});

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!("fallback"));
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_method_aborts_without_trying_later_webhooks() {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({}))]);
        let config = json!({
            "webhooks": [
                {"url": "https://a.example/${args.id}", "method": "TRACE"},
                {"url": "https://b.example"}
            ],
            "output": "fallback"
        });

        let result = interpreter(&transport).execute(&config, &args(json!({"id": "7"}))).await;

        assert_eq!(
            result,
            Err(DataMapError::UnsupportedMethod {
                method: "TRACE".to_string(),
                url: "https://a.example/7".to_string(),
            })
        );
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn success_without_output_returns_raw_response() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!([1, 2, 3]))]);
        let config = json!({"webhooks": [{"url": "https://a.example", "method": "GET"}]});

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!([1, 2, 3]));
        Ok(())
    }

    #[tokio::test]
    async fn array_responses_are_exposed_as_array() -> Result<(), DataMapError> {
        let transport =
            ScriptedTransport::with_replies(vec![ok(200, json!([{"name": "a"}, {"name": "b"}]))]);
        let config = json!({
            "webhooks": [{
                "url": "https://a.example",
                "output": "${array[1].name} / ${response.name}"
            }]
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!("b / <MISSING:response.name>"));
        Ok(())
    }

    #[tokio::test]
    async fn foreach_concatenates_items_into_result() -> Result<(), DataMapError> {
        let transport =
            ScriptedTransport::with_replies(vec![ok(200, json!({"data": [{"v": 1}, {"v": 2}]}))]);
        let config = json!({
            "webhooks": [{
                "url": "https://a.example",
                "foreach": {"append": "${this.v};"},
                "output": "${result}"
            }]
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!("1;2;"));
        Ok(())
    }

    #[tokio::test]
    async fn foreach_respects_max_and_custom_keys() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(
            200,
            json!({"results": {"items": ["x", "y", "z"]}}),
        )]);
        let config = json!({
            "webhooks": [{
                "url": "https://a.example",
                "foreach": {"input_key": "results.items", "output_key": "joined", "max": 2, "append": "[${this.value}]"},
                "output": {"response": "${joined}"}
            }]
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;
        assert_eq!(result, json!({"response": "[x][y]"}));
        Ok(())
    }

    #[test]
    fn foreach_aggregation_unit_cases() {
        let response = json!({"data": [{"v": 1}, {"v": 2}]});
        let spec = ForeachSpec { append: Some("${this.v};".to_string()), ..ForeachSpec::default() };
        assert_eq!(aggregate_foreach(&spec, &response), Some("1;2;".to_string()));

        let capped = ForeachSpec { max: Some(1), ..spec.clone() };
        assert_eq!(aggregate_foreach(&capped, &response), Some("1;".to_string()));

        let dotted = ForeachSpec {
            input_key: Some("rows.v1".to_string()),
            append: Some("${this.value},".to_string()),
            ..ForeachSpec::default()
        };
        let literal_key = json!({"rows.v1": ["a", "b"], "rows": {"v1": ["nested"]}});
        assert_eq!(aggregate_foreach(&dotted, &literal_key), Some("a,b,".to_string()));
        let nested_only = json!({"rows": {"v1": ["nested"]}});
        assert_eq!(aggregate_foreach(&dotted, &nested_only), Some("nested,".to_string()));

        let not_list = json!({"data": "scalar"});
        assert_eq!(aggregate_foreach(&spec, &not_list), None);
        assert_eq!(aggregate_foreach(&spec, &json!({})), None);
    }

    #[tokio::test]
    async fn payload_uses_params_before_body_before_data() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![
            ok(200, json!({})),
            ok(200, json!({})),
            ok(200, json!({})),
            ok(200, json!({})),
        ]);
        let interpreter = interpreter(&transport);
        let call_args = args(json!({"city": "Austin"}));

        let documents = [
            json!({"webhooks": [{"url": "u", "params": {"q": "${city}"}, "body": "ignored", "data": "ignored"}]}),
            json!({"webhooks": [{"url": "u", "body": {"q": "${args.city}"}, "data": "ignored"}]}),
            json!({"webhooks": [{"url": "u", "body": "city=${city}"}]}),
            json!({"webhooks": [{"url": "u", "data": {"q": "${city}"}}]}),
        ];
        for document in &documents {
            interpreter.execute(document, &call_args).await?;
        }

        let bodies: Vec<Option<String>> =
            transport.requests().into_iter().map(|request| request.body).collect();
        assert_eq!(
            bodies,
            vec![
                Some(r#"{"q":"Austin"}"#.to_string()),
                Some(r#"{"q":"Austin"}"#.to_string()),
                Some("city=Austin".to_string()),
                Some(r#"{"q":"${city}"}"#.to_string()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn string_data_is_sent_without_expansion() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({}))]);
        let config = json!({"webhooks": [{"url": "u", "method": "PUT", "data": "raw ${city}"}]});

        interpreter(&transport).execute(&config, &args(json!({"city": "Austin"}))).await?;

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[0].body.as_deref(), Some("raw ${city}"));
        assert_eq!(requests[0].header("content-type"), None);
        Ok(())
    }

    #[tokio::test]
    async fn get_requests_carry_no_payload_and_expand_url_and_headers() -> Result<(), DataMapError>
    {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({}))]);
        let config = json!({
            "webhooks": [{
                "url": "https://api.example.com/weather?q=${args.city}",
                "method": "get",
                "headers": {"X-Key": "%{key}", "Content-Type": "text/plain"},
                "params": {"q": "${city}"}
            }]
        });

        interpreter(&transport)
            .execute(&config, &args(json!({"city": "Austin", "key": "k-1"})))
            .await?;

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].url, "https://api.example.com/weather?q=Austin");
        assert_eq!(requests[0].header("x-key"), Some("k-1"));
        assert_eq!(requests[0].body, None);
        Ok(())
    }

    #[tokio::test]
    async fn json_payloads_default_content_type() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({}))]);
        let config = json!({"webhooks": [{"url": "u", "params": {"a": "b"}}]});

        interpreter(&transport).execute(&config, &Map::new()).await?;

        assert_eq!(transport.requests()[0].header("Content-Type"), Some("application/json"));
        Ok(())
    }

    #[tokio::test]
    async fn args_are_visible_named_and_flattened() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![]);
        let config = json!({"output": "${name}|${args.name}"});

        let result =
            interpreter(&transport).execute(&config, &args(json!({"name": "Ann"}))).await?;

        assert_eq!(result, json!("Ann|Ann"));
        Ok(())
    }

    #[tokio::test]
    async fn flattened_arg_named_args_replaces_named_entry() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![]);
        let config = json!({"output": "${args}|${args.args}"});

        let result =
            interpreter(&transport).execute(&config, &args(json!({"args": "flat"}))).await?;

        assert_eq!(result, json!("flat|<MISSING:args.args>"));
        Ok(())
    }

    #[tokio::test]
    async fn expression_patterns_see_platform_style_args_text() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![]);
        let config = json!({
            "expressions": [
                {"pattern": "\"vip\":true", "output": "compact-json"},
                {"pattern": "'vip': True", "output": "vip"}
            ],
            "output": "nomatch"
        });
        let interpreter = interpreter(&transport);

        let vip = interpreter.execute(&config, &args(json!({"vip": true}))).await?;
        assert_eq!(vip, json!("vip"));

        let regular = interpreter.execute(&config, &args(json!({"vip": false}))).await?;
        assert_eq!(regular, json!("nomatch"));
        Ok(())
    }

    #[test]
    fn args_text_renders_like_the_platform() {
        let text = super::args_text(&args(json!({
            "name": "O'Brien",
            "note": null,
            "tags": ["a", 2, 1.5],
            "nested": {"ok": false, "line": "a\nb"}
        })));

        assert_eq!(
            text,
            r#"{'name': "O'Brien", 'note': None, 'tags': ['a', 2, 1.5], 'nested': {'ok': False, 'line': 'a\nb'}}"#
        );
        assert_eq!(super::args_text(&Map::new()), "{}");
    }

    #[tokio::test]
    async fn failed_attempt_context_does_not_leak_into_next_webhook() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![
            ok(200, json!({"retry": 1, "secret": "first"})),
            ok(200, json!({"other": "second"})),
        ]);
        let config = json!({
            "webhooks": [
                {"url": "https://a.example", "error_keys": "retry"},
                {"url": "https://b.example/${response.secret}", "output": "${response.secret}"}
            ]
        });

        let result = interpreter(&transport).execute(&config, &Map::new()).await?;

        assert_eq!(result, json!("<MISSING:response.secret>"));
        assert_eq!(transport.requests()[1].url, "https://b.example/<MISSING:response.secret>");
        Ok(())
    }

    #[tokio::test]
    async fn timeout_setting_is_forwarded() -> Result<(), DataMapError> {
        let transport = ScriptedTransport::with_replies(vec![ok(200, json!({}))]);
        let interpreter = DataMapInterpreter::with_settings(
            transport.clone(),
            super::InterpreterSettings { timeout: std::time::Duration::from_secs(5) },
        );

        interpreter.execute(&json!({"webhooks": [{"url": "u"}]}), &Map::new()).await?;

        assert_eq!(transport.requests()[0].timeout, std::time::Duration::from_secs(5));
        Ok(())
    }
}
