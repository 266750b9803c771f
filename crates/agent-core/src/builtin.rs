//! Built-in Tools

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;
use crate::tool::{Arguments, Tool, ToolResult, ToolSpec};

/// All tools shipped with the core, in registration order
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(CurrentTimeTool::new())]
}

/// Returns the current UTC time as an RFC 3339 string.
///
/// Never reports a time earlier than one it already returned, even if the
/// system clock steps backwards.
#[derive(Default)]
pub struct CurrentTimeTool {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl CurrentTimeTool {
    pub const NAME: &'static str = "get_current_time";

    pub fn new() -> Self {
        Self::default()
    }

    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = last.map_or_else(Utc::now, |prev| prev.max(Utc::now()));
        *last = Some(now);
        now
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            Self::NAME,
            "Get the current time. Use this whenever the user asks what time it is; \
             you do not know the time yourself.",
        )
    }

    async fn execute(&self, _arguments: &Arguments) -> Result<ToolResult> {
        let now = self.now();
        Ok(ToolResult::new().with(
            "current_time",
            now.to_rfc3339_opts(SecondsFormat::Micros, true),
        ))
    }
}
