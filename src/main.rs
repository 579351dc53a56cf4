//! DeepAgent 演示入口
//!
//! 加载配置、初始化日志，用回显专家跑一段脚本化会话，最后以 JSON 打印摘要与校验结果。

use std::sync::Arc;

use anyhow::Context;
use deepagent::{
    config::load_config,
    core::AgentStatus,
    observability,
    specialists::{EchoSpecialist, SpecialistCatalog},
    tools::session_executor,
    Session,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    observability::init(&cfg.app.log_level);

    let session = Session::new(&cfg);
    let catalog = SpecialistCatalog::new()
        .with(
            "stock_analyst",
            "Individual equity analysis",
            &["get_stock_price", "get_financials"],
            Arc::new(EchoSpecialist::new("stock_analyst")),
        )
        .with(
            "market_researcher",
            "Sector and macro research",
            &["get_market_overview", "search_news"],
            Arc::new(EchoSpecialist::new("market_researcher")),
        );
    let executor = session_executor(&session, catalog, &cfg);

    session.advance_iteration().await.context("Failed to start session")?;
    executor
        .execute("register_specialist", json!({"name": "stock_analyst"}))
        .await?;
    executor
        .execute("register_specialist", json!({"name": "market_researcher"}))
        .await?;
    executor
        .execute(
            "write_todos",
            json!({"todos": "1. Analyze AAPL fundamentals [HIGH]\n2. Survey the semiconductor sector\n3. Write the final report"}),
        )
        .await?;

    // 依次把可执行任务交给对应专家，结果落到虚拟文件
    while let Some(task) = session.next_ready_task().await {
        let specialist = if task.description.contains("sector") {
            "market_researcher"
        } else {
            "stock_analyst"
        };
        let artifact = format!("results/{}.json", task.id);
        executor
            .execute(
                "delegate",
                json!({"specialist": specialist, "task": task.description, "task_id": task.id, "artifact": artifact}),
            )
            .await?;
        session.advance_iteration().await?;
    }

    session.transition(AgentStatus::Summarizing).await?;
    let files = session.list_files(Some("results")).await;
    session
        .write_file("final_report.md", format!("# Report\n\nArtifacts: {}\n", files.join(", ")), Default::default())
        .await?;
    session.transition(AgentStatus::Completed).await?;

    println!("{}", executor.execute("get_summary", json!({})).await?);
    println!("{}", executor.execute("validate", json!({})).await?);
    Ok(())
}
