use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::tools::ToolRegistry;

#[derive(Default)]
pub struct AgentRuntime {
    registry: ToolRegistry,
}

impl AgentRuntime {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs one function call and always hands back a value the caller can render.
    ///
    /// Dispatch failures become `{"response": "..."}` so the conversation can continue.
    pub async fn handle_function_call(&self, function: &str, args: Value) -> Value {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "agent.function_call.received",
            correlation_id = %correlation_id,
            function,
            "dispatching function call"
        );

        match self.registry.dispatch(function, args).await {
            Ok(result) => {
                info!(
                    event_name = "agent.function_call.completed",
                    correlation_id = %correlation_id,
                    function,
                    "function call completed"
                );
                result
            }
            Err(error) => {
                warn!(
                    event_name = "agent.function_call.failed",
                    correlation_id = %correlation_id,
                    function,
                    error = %error,
                    "function call failed"
                );
                json!({"response": format!("Function `{function}` failed: {error}")})
            }
        }
    }
}
