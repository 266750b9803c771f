//! Tool Invoker
//!
//! Runs registered tools and folds every failure mode into a
//! [`ToolResult`] carrying an `error` field, so the model sees what went
//! wrong instead of the loop aborting. The one exception is an unknown tool
//! name, which is returned as [`AgentError::UnknownTool`] for the caller to
//! decide on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::error::{AgentError, Result};
use crate::tool::{Arguments, ToolRegistry, ToolResult};

/// Executes tools from a shared, read-only registry
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolInvoker {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Upper bound on a single tool execution
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validate and run `name`.
    ///
    /// Never mutates session state. Returns `Err` only for an unregistered
    /// tool name.
    pub async fn invoke(&self, name: &str, arguments: &Arguments) -> Result<ToolResult> {
        let (spec, tool) = self.registry.lookup(name)?;

        if let Err(e) = spec.validate(arguments) {
            tracing::warn!(tool = %name, error = %e, "Rejected tool arguments");
            return Ok(ToolResult::error(e.to_string()));
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.timeout,
            AssertUnwindSafe(tool.execute(arguments)).catch_unwind(),
        )
        .await;

        let result = match outcome {
            Err(_) => ToolResult::error(format!(
                "tool '{name}' timed out after {}ms",
                self.timeout.as_millis()
            )),
            Ok(Err(_)) => ToolResult::error(format!("tool '{name}' panicked")),
            Ok(Ok(Err(e))) => ToolResult::error(e.to_string()),
            Ok(Ok(Ok(result))) => match result.non_primitive_key() {
                Some(key) => ToolResult::error(
                    AgentError::ToolExecution(format!(
                        "tool '{name}' returned a non-primitive value for '{key}'"
                    ))
                    .to_string(),
                ),
                None => result,
            },
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result.error_message() {
            Some(error) => tracing::warn!(tool = %name, elapsed_ms, error, "Tool failed"),
            None => tracing::debug!(tool = %name, elapsed_ms, "Tool succeeded"),
        }

        Ok(result)
    }
}
