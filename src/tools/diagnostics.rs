//! 诊断工具：get_summary / validate

use async_trait::async_trait;
use serde_json::Value;

use crate::core::Session;
use crate::tools::registry::to_json;
use crate::tools::Tool;

pub struct SummaryTool {
    session: Session,
}

impl SummaryTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SummaryTool {
    fn name(&self) -> &str {
        "get_summary"
    }

    fn description(&self) -> &str {
        "Session summary: status, iteration, task/file/specialist/cache counts. No args."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        to_json(&self.session.summary().await)
    }
}

pub struct ValidateTool {
    session: Session,
}

impl ValidateTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ValidateTool {
    fn name(&self) -> &str {
        "validate"
    }

    fn description(&self) -> &str {
        "List consistency issues (orphaned dependencies, iteration limit, stale active specialists). No args."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        let issues: Vec<Value> = self
            .session
            .validate()
            .await
            .into_iter()
            .map(|issue| {
                let mut v = serde_json::to_value(&issue).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut v {
                    map.insert("message".to_string(), issue.to_string().into());
                }
                v
            })
            .collect();
        to_json(&issues)
    }
}
