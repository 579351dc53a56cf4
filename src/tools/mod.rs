//! 规划方工具面：会话操作以 Tool 形式暴露，由 ToolExecutor 统一加超时与审计

pub mod cache;
pub mod delegation;
pub mod diagnostics;
pub mod executor;
pub mod files;
pub mod registry;
pub mod tasks;

use std::time::Duration;

pub use cache::{CacheGetTool, CachePutTool};
pub use delegation::{DelegateTool, RegisterSpecialistTool};
pub use diagnostics::{SummaryTool, ValidateTool};
pub use executor::ToolExecutor;
pub use files::{EditFileTool, ListFilesTool, ReadFileTool, WriteFileTool};
pub use registry::{Tool, ToolRegistry};
pub use tasks::{AddTaskTool, NextTaskTool, UpdateTaskStatusTool, WriteTodosTool};

use crate::config::AppConfig;
use crate::core::Session;
use crate::specialists::SpecialistCatalog;

/// 绑定到同一会话的全部工具
pub fn session_toolset(session: &Session, catalog: SpecialistCatalog) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(AddTaskTool::new(session.clone()));
    registry.register(WriteTodosTool::new(session.clone()));
    registry.register(UpdateTaskStatusTool::new(session.clone()));
    registry.register(NextTaskTool::new(session.clone()));
    registry.register(WriteFileTool::new(session.clone()));
    registry.register(ReadFileTool::new(session.clone()));
    registry.register(EditFileTool::new(session.clone()));
    registry.register(ListFilesTool::new(session.clone()));
    registry.register(CachePutTool::new(session.clone()));
    registry.register(CacheGetTool::new(session.clone()));
    registry.register(RegisterSpecialistTool::new(session.clone(), catalog));
    registry.register(DelegateTool::new(session.clone()));
    registry.register(SummaryTool::new(session.clone()));
    registry.register(ValidateTool::new(session.clone()));
    registry
}

/// 按配置创建执行器；delegate 的超时放宽到委派超时之上，避免工具层先于专家超时
pub fn session_executor(session: &Session, catalog: SpecialistCatalog, cfg: &AppConfig) -> ToolExecutor {
    ToolExecutor::new(session_toolset(session, catalog), cfg.tools.tool_timeout_secs).with_timeout_for(
        "delegate",
        Duration::from_secs(cfg.delegation.timeout_secs.saturating_add(5)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::core::SessionError;
    use crate::specialists::EchoSpecialist;

    fn setup() -> (Session, ToolExecutor) {
        let cfg = AppConfig::default();
        let session = Session::new(&cfg);
        let catalog = SpecialistCatalog::new().with(
            "stock_analyst",
            "Individual equity analysis",
            &["get_stock_price", "get_financials"],
            Arc::new(EchoSpecialist::new("stock_analyst")),
        );
        let executor = session_executor(&session, catalog, &cfg);
        (session, executor)
    }

    fn parse(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn test_toolset_names() {
        let (_, executor) = setup();
        let names = executor.tool_names();
        for expected in [
            "add_task",
            "write_todos",
            "update_task_status",
            "next_task",
            "write_file",
            "read_file",
            "edit_file",
            "list_files",
            "cache_put",
            "cache_get",
            "register_specialist",
            "delegate",
            "get_summary",
            "validate",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_task_tools() {
        let (_, executor) = setup();
        let created = parse(
            &executor
                .execute("write_todos", json!({"todos": "1. Analyze AAPL [HIGH]\n2. Check news"}))
                .await
                .unwrap(),
        );
        let ids = created["created"].as_array().unwrap();
        assert_eq!(ids.len(), 2);

        let next = parse(&executor.execute("next_task", json!({})).await.unwrap());
        assert_eq!(next["description"], json!("Analyze AAPL"));
        assert_eq!(next["priority"], json!("high"));

        let updated = parse(
            &executor
                .execute(
                    "update_task_status",
                    json!({"task_id": ids[0], "status": "completed", "metadata": {"note": "done"}}),
                )
                .await
                .unwrap(),
        );
        assert_eq!(updated["status"], json!("completed"));
        assert_eq!(updated["metadata"]["note"], json!("done"));

        let err = executor
            .execute("update_task_status", json!({"task_id": "todo_404", "status": "completed"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ToolExecutionFailed(_)));

        let err = executor
            .execute("add_task", json!({"description": "x", "priority": "critical"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ToolExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_file_tools() {
        let (_, executor) = setup();
        executor
            .execute("write_file", json!({"file_path": "/reports/aapl.md", "content": "AAPL: HOLD"}))
            .await
            .unwrap();
        let edited = parse(
            &executor
                .execute(
                    "edit_file",
                    json!({"file_path": "reports/aapl.md", "old_string": "HOLD", "new_string": "BUY"}),
                )
                .await
                .unwrap(),
        );
        assert_eq!(edited["replacements"], json!(1));
        assert_eq!(
            executor.execute("read_file", json!({"file_path": "reports/aapl.md"})).await.unwrap(),
            "AAPL: BUY"
        );
        let listed = parse(&executor.execute("list_files", json!({"directory": "reports"})).await.unwrap());
        assert_eq!(listed, json!(["reports/aapl.md"]));
        assert!(executor.execute("read_file", json!({"file_path": "missing.md"})).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_tools() {
        let (_, executor) = setup();
        executor
            .execute("cache_put", json!({"subject": "AAPL", "kind": "price", "payload": {"p": 100}}))
            .await
            .unwrap();
        let hit = parse(&executor.execute("cache_get", json!({"subject": "AAPL", "kind": "price"})).await.unwrap());
        assert_eq!(hit, json!({"p": 100}));
        let miss = parse(&executor.execute("cache_get", json!({"subject": "MSFT", "kind": "price"})).await.unwrap());
        assert_eq!(miss, Value::Null);
    }

    #[tokio::test]
    async fn test_register_and_delegate_tools() {
        let (session, executor) = setup();
        let record = parse(
            &executor
                .execute("register_specialist", json!({"name": "stock_analyst"}))
                .await
                .unwrap(),
        );
        assert_eq!(record["status"], json!("idle"));
        assert_eq!(record["capabilities"], json!(["get_stock_price", "get_financials"]));

        assert!(executor
            .execute("register_specialist", json!({"name": "crystal_ball"}))
            .await
            .is_err());

        let result = parse(
            &executor
                .execute("delegate", json!({"specialist": "stock_analyst", "task": "analyze AAPL"}))
                .await
                .unwrap(),
        );
        assert_eq!(result["echo"], json!("analyze AAPL"));
        assert_eq!(
            session.specialist("stock_analyst").await.unwrap().status,
            crate::specialists::SpecialistStatus::Completed
        );

        let err = executor
            .execute("delegate", json!({"specialist": "unknown_agent", "task": "x"}))
            .await
            .unwrap_err();
        match err {
            SessionError::ToolExecutionFailed(msg) => assert!(msg.contains("stock_analyst")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_diagnostic_tools() {
        let (session, executor) = setup();
        let id = session.add_task(crate::todo::NewTask::new("T2").depends_on("T99")).await.id;
        let summary = parse(&executor.execute("get_summary", json!({})).await.unwrap());
        assert_eq!(summary["task_count"], json!(1));

        let issues = parse(&executor.execute("validate", json!({})).await.unwrap());
        let issues = issues.as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0]["message"],
            json!(format!("TODO {id} has orphaned dependency: T99"))
        );
    }
}
