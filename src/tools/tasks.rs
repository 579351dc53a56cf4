//! 待办工具：add_task / write_todos / update_task_status / next_task

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{payload_from_value, Payload, Session};
use crate::todo::{NewTask, Priority, TaskStatus};
use crate::tools::registry::{optional_str, required_str, to_json};
use crate::tools::Tool;

/// 新增单个任务
pub struct AddTaskTool {
    session: Session,
}

impl AddTaskTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "add_task"
    }

    fn description(&self) -> &str {
        "Add a TODO task. Args: {\"description\": \"...\", \"priority\": \"low|medium|high|urgent\", \"assignee\": \"...\", \"dependencies\": [\"todo_1_...\"]}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "medium", "high", "urgent"]},
                "assignee": {"type": "string"},
                "dependencies": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let mut new = NewTask::new(required_str(&args, "description")?);
        if let Some(p) = optional_str(&args, "priority") {
            new = new.priority(p.parse::<Priority>().map_err(|e| e.to_string())?);
        }
        if let Some(a) = optional_str(&args, "assignee") {
            new = new.assignee(a);
        }
        if let Some(deps) = args.get("dependencies").and_then(|v| v.as_array()) {
            for dep in deps.iter().filter_map(|d| d.as_str()) {
                new = new.depends_on(dep);
            }
        }
        let task = self.session.add_task(new).await;
        to_json(&task)
    }
}

/// 把多行 TODO 文本批量转成任务
pub struct WriteTodosTool {
    session: Session,
}

impl WriteTodosTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for WriteTodosTool {
    fn name(&self) -> &str {
        "write_todos"
    }

    fn description(&self) -> &str {
        "Create one task per non-empty line. Bullets (1. / - / *) are stripped; [HIGH] style markers set priority. Args: {\"todos\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"todos": {"type": "string"}},
            "required": ["todos"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let ids = self.session.write_todos(required_str(&args, "todos")?).await;
        to_json(&json!({"created": ids}))
    }
}

pub struct UpdateTaskStatusTool {
    session: Session,
}

impl UpdateTaskStatusTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for UpdateTaskStatusTool {
    fn name(&self) -> &str {
        "update_task_status"
    }

    fn description(&self) -> &str {
        "Set a task's status and merge metadata. Args: {\"task_id\": \"...\", \"status\": \"pending|in_progress|completed|cancelled\", \"metadata\": {..}}"
    }

    fn parameters_schema(&self) -> Value {
        let statuses: Vec<&str> = TaskStatus::ALL.iter().map(|s| s.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "status": {"type": "string", "enum": statuses},
                "metadata": {"type": "object"}
            },
            "required": ["task_id", "status"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let id = required_str(&args, "task_id")?;
        let status = required_str(&args, "status")?
            .parse::<TaskStatus>()
            .map_err(|e| e.to_string())?;
        let patch = args
            .get("metadata")
            .cloned()
            .map(payload_from_value)
            .unwrap_or_else(Payload::new);
        let task = self
            .session
            .update_task_status(id, status, patch)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&task)
    }
}

/// 下一个可执行任务（依赖全部完成的最高优先级 pending 任务）
pub struct NextTaskTool {
    session: Session,
}

impl NextTaskTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for NextTaskTool {
    fn name(&self) -> &str {
        "next_task"
    }

    fn description(&self) -> &str {
        "Return the next ready task, or null when nothing is ready. No args."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        to_json(&self.session.next_ready_task().await)
    }
}
