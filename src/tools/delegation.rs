//! 专家工具：register_specialist（从目录取句柄）/ delegate

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Session;
use crate::specialists::{DelegationRequest, SpecialistCatalog};
use crate::tools::registry::{optional_str, required_str, to_json};
use crate::tools::Tool;

/// 注册专家：名称必须在目录中，描述与能力可覆盖目录默认值
pub struct RegisterSpecialistTool {
    session: Session,
    catalog: SpecialistCatalog,
}

impl RegisterSpecialistTool {
    pub fn new(session: Session, catalog: SpecialistCatalog) -> Self {
        Self { session, catalog }
    }
}

#[async_trait]
impl Tool for RegisterSpecialistTool {
    fn name(&self) -> &str {
        "register_specialist"
    }

    fn description(&self) -> &str {
        "Register a specialist from the catalog. Args: {\"name\": \"stock_analyst\", \"description\": \"...\", \"capabilities\": [\"get_stock_price\"]}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "enum": self.catalog.names()},
                "description": {"type": "string"},
                "capabilities": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let name = required_str(&args, "name")?;
        let entry = self.catalog.get(name).ok_or_else(|| {
            format!(
                "Specialist '{}' is not in the catalog. Available: {}",
                name,
                self.catalog.names().join(", ")
            )
        })?;
        let description = optional_str(&args, "description").unwrap_or(entry.description.as_str());
        let capabilities = match args.get("capabilities").and_then(|v| v.as_array()) {
            Some(list) => list
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect(),
            None => entry.capabilities.clone(),
        };
        let record = self
            .session
            .register_specialist(name, description, capabilities, entry.handle.clone())
            .await;
        to_json(&record)
    }
}

pub struct DelegateTool {
    session: Session,
}

impl DelegateTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Hand a task to a registered specialist. Args: {\"specialist\": \"stock_analyst\", \"task\": \"...\", \"task_id\": \"todo_1_...\", \"artifact\": \"analysis/aapl.json\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "specialist": {"type": "string"},
                "task": {"type": "string"},
                "task_id": {"type": "string"},
                "artifact": {"type": "string"}
            },
            "required": ["specialist", "task"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let mut request = DelegationRequest::new(required_str(&args, "specialist")?, required_str(&args, "task")?);
        if let Some(id) = optional_str(&args, "task_id") {
            request = request.for_task(id);
        }
        if let Some(artifact) = optional_str(&args, "artifact") {
            request = request.save_to(artifact);
        }
        let result = self.session.delegate(request).await.map_err(|e| e.to_string())?;
        to_json(&result)
    }
}
