//! 专家注册表
//!
//! 每个会话持有自己的注册表实例（没有进程级单例），按名称存储 SpecialistRecord 与调用句柄。
//! 重复注册同名专家会整体覆盖旧记录；记录从不删除。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{Payload, SessionError, Workspace};

/// 专家状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistStatus {
    Idle,
    Working,
    Completed,
    Error,
}

impl fmt::Display for SpecialistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpecialistStatus::Idle => "idle",
            SpecialistStatus::Working => "working",
            SpecialistStatus::Completed => "completed",
            SpecialistStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// 专家调用时拿到的上下文
///
/// workspace 只能经由会话锁修改任务与文件；cancel 在会话取消或超时前被触发时应尽快返回。
#[derive(Clone)]
pub struct SpecialistContext {
    pub task: String,
    pub workspace: Workspace,
    pub cancel: CancellationToken,
}

/// 专家能力：接收任务描述，返回结构化结果或失败原因
#[async_trait]
pub trait Specialist: Send + Sync {
    async fn invoke(&self, ctx: SpecialistContext) -> Result<Payload, String>;
}

/// 注册表中的专家记录
#[derive(Debug, Clone, Serialize)]
pub struct SpecialistRecord {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub status: SpecialistStatus,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub last_result: Option<Payload>,
}

/// 专家注册表：记录 + 调用句柄
#[derive(Clone, Default)]
pub struct SpecialistRegistry {
    records: BTreeMap<String, SpecialistRecord>,
    handles: BTreeMap<String, Arc<dyn Specialist>>,
}

impl fmt::Debug for SpecialistRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialistRegistry")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（status = idle）；同名覆盖，不合并
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        capabilities: Vec<String>,
        handle: Arc<dyn Specialist>,
    ) -> &SpecialistRecord {
        let now = Utc::now();
        let record = SpecialistRecord {
            name: name.to_string(),
            description: description.to_string(),
            capabilities,
            status: SpecialistStatus::Idle,
            created_at: now,
            last_active: now,
            last_result: None,
        };
        if self.records.insert(name.to_string(), record).is_some() {
            tracing::warn!(specialist = %name, "specialist re-registered, previous record replaced");
        } else {
            tracing::info!(specialist = %name, "specialist registered");
        }
        self.handles.insert(name.to_string(), handle);
        &self.records[name]
    }

    /// 更新状态与 last_active；提供 result 时替换 last_result
    pub fn mark(
        &mut self,
        name: &str,
        status: SpecialistStatus,
        result: Option<Payload>,
    ) -> Result<&SpecialistRecord, SessionError> {
        if !self.records.contains_key(name) {
            return Err(SessionError::SpecialistNotFound {
                name: name.to_string(),
                available: self.names(),
            });
        }
        if let Some(record) = self.records.get_mut(name) {
            record.status = status;
            record.last_active = Utc::now();
            if let Some(result) = result {
                record.last_result = Some(result);
            }
        }
        Ok(&self.records[name])
    }

    pub fn get(&self, name: &str) -> Option<&SpecialistRecord> {
        self.records.get(name)
    }

    pub fn handle(&self, name: &str) -> Option<Arc<dyn Specialist>> {
        self.handles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// 已注册名称（有序）
    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &SpecialistRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 回显专家（测试与演示用）：返回 `{"specialist": name, "echo": task}`
pub struct EchoSpecialist {
    name: String,
}

impl EchoSpecialist {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Specialist for EchoSpecialist {
    async fn invoke(&self, ctx: SpecialistContext) -> Result<Payload, String> {
        let mut result = Payload::new();
        result.insert("specialist".to_string(), self.name.clone().into());
        result.insert("echo".to_string(), ctx.task.into());
        Ok(result)
    }
}

/// 可供 register_specialist 工具按名称取用的专家目录
#[derive(Clone, Default)]
pub struct SpecialistCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

#[derive(Clone)]
pub struct CatalogEntry {
    pub description: String,
    pub capabilities: Vec<String>,
    pub handle: Arc<dyn Specialist>,
}

impl SpecialistCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: &str,
        description: &str,
        capabilities: &[&str],
        handle: Arc<dyn Specialist>,
    ) -> Self {
        self.entries.insert(
            name.to_string(),
            CatalogEntry {
                description: description.to_string(),
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                handle,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload_from_value;
    use serde_json::json;

    fn echo() -> Arc<dyn Specialist> {
        Arc::new(EchoSpecialist::new("echo"))
    }

    #[test]
    fn test_register_starts_idle() {
        let mut registry = SpecialistRegistry::new();
        let record = registry.register(
            "stock_analyst",
            "Individual equity analysis",
            vec!["get_stock_price".to_string()],
            echo(),
        );
        assert_eq!(record.status, SpecialistStatus::Idle);
        assert!(record.last_result.is_none());
        assert!(registry.handle("stock_analyst").is_some());
    }

    #[test]
    fn test_reregister_overwrites() {
        let mut registry = SpecialistRegistry::new();
        registry.register("risk_assessor", "v1", vec!["var".to_string()], echo());
        registry
            .mark("risk_assessor", SpecialistStatus::Completed, Some(payload_from_value(json!({"var": 0.05}))))
            .unwrap();
        registry.register("risk_assessor", "v2", vec![], echo());

        let record = registry.get("risk_assessor").unwrap();
        assert_eq!(record.description, "v2");
        assert!(record.capabilities.is_empty());
        assert_eq!(record.status, SpecialistStatus::Idle);
        assert!(record.last_result.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mark_without_result_keeps_last_result() {
        let mut registry = SpecialistRegistry::new();
        registry.register("stock_analyst", "", vec![], echo());
        registry
            .mark("stock_analyst", SpecialistStatus::Completed, Some(payload_from_value(json!({"rec": "BUY"}))))
            .unwrap();
        let record = registry.mark("stock_analyst", SpecialistStatus::Working, None).unwrap();
        assert_eq!(record.status, SpecialistStatus::Working);
        assert_eq!(record.last_result.as_ref().unwrap()["rec"], json!("BUY"));
    }

    #[test]
    fn test_mark_unknown_is_not_found() {
        let mut registry = SpecialistRegistry::new();
        registry.register("stock_analyst", "", vec![], echo());
        let err = registry.mark("ghost", SpecialistStatus::Working, None).unwrap_err();
        assert_eq!(
            err,
            SessionError::SpecialistNotFound {
                name: "ghost".to_string(),
                available: vec!["stock_analyst".to_string()],
            }
        );
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = SpecialistCatalog::new().with("market_researcher", "Macro trends", &["get_market_overview"], echo());
        let entry = catalog.get("market_researcher").unwrap();
        assert_eq!(entry.capabilities, vec!["get_market_overview".to_string()]);
        assert!(catalog.get("stock_analyst").is_none());
    }
}
