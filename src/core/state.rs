//! 会话状态：聚合任务待办、虚拟文件、过期缓存、专家注册表与控制元数据
//!
//! SessionState 独占这四个集合，不与其它会话共享。所有成功的变更都会刷新 last_activity；
//! 失败的变更不产生任何改动。并发访问由 `Session` 外层的一把互斥锁串行化。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, ExpiringCache};
use crate::config::AppConfig;
use crate::core::{Payload, SessionError};
use crate::specialists::{DelegationRecord, Specialist, SpecialistRecord, SpecialistRegistry, SpecialistStatus};
use crate::todo::{parse_todo_list, NewTask, Task, TaskBacklog, TaskId, TaskStatus};
use crate::vfs::{FileEntry, FileKind, FileOp, VirtualFs};

/// Agent 生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Initializing,
    Planning,
    Executing,
    Delegating,
    Summarizing,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }

    /// 合法转换；同状态视为合法，终态不可离开
    pub fn can_transition_to(&self, to: AgentStatus) -> bool {
        use AgentStatus::*;
        if self.is_terminal() {
            return false;
        }
        if *self == to || to == Error {
            return true;
        }
        matches!(
            (self, to),
            (Initializing, Planning | Executing)
                | (Planning, Executing | Delegating | Summarizing)
                | (Executing, Planning | Delegating | Summarizing)
                | (Delegating, Planning | Executing | Summarizing)
                | (Summarizing, Planning | Executing | Completed)
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Planning => "planning",
            AgentStatus::Executing => "executing",
            AgentStatus::Delegating => "delegating",
            AgentStatus::Summarizing => "summarizing",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// 会话运行时限额（由 AppConfig 转换而来）
#[derive(Clone, Debug)]
pub struct SessionLimits {
    pub max_iterations: u32,
    pub default_ttl: Duration,
    pub max_files: usize,
    pub max_file_size: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SessionLimits {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            default_ttl: Duration::from_secs(cfg.cache.default_ttl_secs),
            max_files: cfg.files.max_files,
            max_file_size: cfg.files.max_file_size,
        }
    }
}

/// validate() 报告的结构性问题；均为非致命
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    IterationLimitReached { count: u32, max: u32 },
    OrphanedDependency { task_id: TaskId, dependency: TaskId },
    UnknownActiveSpecialist { name: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::IterationLimitReached { count, max } => {
                write!(f, "Iteration limit reached: {count}/{max}")
            }
            ValidationIssue::OrphanedDependency { task_id, dependency } => {
                write!(f, "TODO {task_id} has orphaned dependency: {dependency}")
            }
            ValidationIssue::UnknownActiveSpecialist { name } => {
                write!(f, "Active specialist {name} not found in specialist registry")
            }
        }
    }
}

/// 用于监控 / 调试的只读摘要
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub agent_status: AgentStatus,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub task_count: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub cancelled_tasks: usize,
    pub file_count: usize,
    pub specialist_count: usize,
    pub active_specialists: usize,
    pub cache_size: usize,
    pub delegation_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// 完整状态的可序列化快照
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub summary: SessionSummary,
    pub tasks: Vec<Task>,
    pub files: Vec<FileEntry>,
    pub file_operations: Vec<FileOp>,
    pub cache: Vec<CacheEntry>,
    pub specialists: Vec<SpecialistRecord>,
    pub active_specialists: Vec<String>,
    pub delegation_history: Vec<DelegationRecord>,
}

/// 会话状态聚合
#[derive(Clone, Debug)]
pub struct SessionState {
    session_id: String,
    backlog: TaskBacklog,
    files: VirtualFs,
    cache: ExpiringCache,
    specialists: SpecialistRegistry,
    active_specialists: Vec<String>,
    delegation_history: Vec<DelegationRecord>,
    iteration_count: u32,
    max_iterations: u32,
    status: AgentStatus,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl SessionState {
    pub fn new(limits: &SessionLimits) -> Self {
        Self::with_id(format!("session_{}", uuid::Uuid::new_v4()), limits)
    }

    pub fn with_id(session_id: impl Into<String>, limits: &SessionLimits) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            backlog: TaskBacklog::new(),
            files: VirtualFs::new(limits.max_files, limits.max_file_size),
            cache: ExpiringCache::new(limits.default_ttl),
            specialists: SpecialistRegistry::new(),
            active_specialists: Vec::new(),
            delegation_history: Vec::new(),
            iteration_count: 0,
            max_iterations: limits.max_iterations,
            status: AgentStatus::Initializing,
            started_at: now,
            last_activity: now,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn backlog(&self) -> &TaskBacklog {
        &self.backlog
    }

    pub fn files(&self) -> &VirtualFs {
        &self.files
    }

    pub fn cache(&self) -> &ExpiringCache {
        &self.cache
    }

    pub fn specialists(&self) -> &SpecialistRegistry {
        &self.specialists
    }

    pub fn active_specialists(&self) -> &[String] {
        &self.active_specialists
    }

    pub fn delegation_history(&self) -> &[DelegationRecord] {
        &self.delegation_history
    }

    // ---- 任务 ----

    pub fn add_task(&mut self, new: NewTask) -> Task {
        let task = self.backlog.add(new).clone();
        self.touch();
        task
    }

    /// 解析 TODO 文本并逐条添加，返回新 ID
    pub fn write_todos(&mut self, text: &str) -> Vec<TaskId> {
        let ids: Vec<TaskId> = parse_todo_list(text)
            .into_iter()
            .map(|new| self.backlog.add(new).id.clone())
            .collect();
        if !ids.is_empty() {
            self.touch();
        }
        ids
    }

    pub fn update_task_status(
        &mut self,
        id: &str,
        status: TaskStatus,
        metadata_patch: Payload,
    ) -> Result<Task, SessionError> {
        let task = self.backlog.update_status(id, status, metadata_patch)?.clone();
        self.touch();
        Ok(task)
    }

    pub fn assign_task(&mut self, id: &str, assignee: &str) -> Result<Task, SessionError> {
        let task = self.backlog.assign(id, assignee)?.clone();
        self.touch();
        Ok(task)
    }

    pub fn add_dependency(&mut self, id: &str, dep_id: &str) -> Result<Task, SessionError> {
        let task = self.backlog.add_dependency(id, dep_id)?.clone();
        self.touch();
        Ok(task)
    }

    pub fn next_ready_task(&self) -> Option<&Task> {
        self.backlog.next_ready()
    }

    // ---- 文件 ----

    pub fn write_file(
        &mut self,
        name: &str,
        content: impl Into<String>,
        kind: FileKind,
    ) -> Result<FileEntry, SessionError> {
        let entry = self.files.write(name, content, kind)?.clone();
        self.touch();
        Ok(entry)
    }

    /// 读取不刷新 last_activity（只追加操作日志）
    pub fn read_file(&mut self, name: &str) -> Option<String> {
        self.files.read(name)
    }

    pub fn edit_file(&mut self, name: &str, search: &str, replace: &str) -> Result<usize, SessionError> {
        let count = self.files.edit(name, search, replace)?;
        self.touch();
        Ok(count)
    }

    pub fn list_files(&self, directory: Option<&str>) -> Vec<String> {
        self.files.list(directory)
    }

    // ---- 缓存 ----

    pub fn cache_put(&mut self, subject: &str, kind: &str, payload: Payload, ttl: Option<Duration>) {
        self.cache.put(subject, kind, payload, ttl);
        self.touch();
    }

    pub fn cache_get(&mut self, subject: &str, kind: &str) -> Option<Payload> {
        self.cache.get(subject, kind)
    }

    // ---- 专家 ----

    pub fn register_specialist(
        &mut self,
        name: &str,
        description: &str,
        capabilities: Vec<String>,
        handle: Arc<dyn Specialist>,
    ) -> SpecialistRecord {
        let record = self
            .specialists
            .register(name, description, capabilities, handle)
            .clone();
        self.touch();
        record
    }

    pub fn mark_specialist(
        &mut self,
        name: &str,
        status: SpecialistStatus,
        result: Option<Payload>,
    ) -> Result<SpecialistRecord, SessionError> {
        let record = self.specialists.mark(name, status, result)?.clone();
        self.touch();
        Ok(record)
    }

    /// 加入活跃列表（不检查注册表，失效引用由 validate 报告）
    pub fn activate_specialist(&mut self, name: &str) {
        if !self.active_specialists.iter().any(|n| n == name) {
            self.active_specialists.push(name.to_string());
        }
        self.touch();
    }

    pub fn deactivate_specialist(&mut self, name: &str) {
        self.active_specialists.retain(|n| n != name);
        self.touch();
    }

    pub(crate) fn record_delegation(&mut self, record: DelegationRecord) {
        self.delegation_history.push(record);
        self.touch();
    }

    // ---- 生命周期 ----

    pub fn transition(&mut self, to: AgentStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if self.status != to {
            tracing::info!(from = %self.status, to = %to, "agent status changed");
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// 迭代计数 +1；initializing 时进入 planning。达到上限不会强制停止，只由 validate 报告
    pub fn advance_iteration(&mut self) -> Result<u32, SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        if self.status == AgentStatus::Initializing {
            self.transition(AgentStatus::Planning)?;
        }
        self.iteration_count += 1;
        self.touch();
        Ok(self.iteration_count)
    }

    // ---- 诊断 ----

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            agent_status: self.status,
            iteration_count: self.iteration_count,
            max_iterations: self.max_iterations,
            task_count: self.backlog.len(),
            pending_tasks: self.backlog.count_by_status(TaskStatus::Pending),
            in_progress_tasks: self.backlog.count_by_status(TaskStatus::InProgress),
            completed_tasks: self.backlog.count_by_status(TaskStatus::Completed),
            cancelled_tasks: self.backlog.count_by_status(TaskStatus::Cancelled),
            file_count: self.files.len(),
            specialist_count: self.specialists.len(),
            active_specialists: self.active_specialists.len(),
            cache_size: self.cache.len(),
            delegation_count: self.delegation_history.len(),
            started_at: self.started_at,
            last_activity: self.last_activity,
        }
    }

    /// 只读检查：迭代上限、孤立依赖、不在注册表中的活跃专家
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.iteration_count >= self.max_iterations {
            issues.push(ValidationIssue::IterationLimitReached {
                count: self.iteration_count,
                max: self.max_iterations,
            });
        }
        for (task_id, dependency) in self.backlog.orphaned_dependencies() {
            issues.push(ValidationIssue::OrphanedDependency { task_id, dependency });
        }
        for name in &self.active_specialists {
            if !self.specialists.contains(name) {
                issues.push(ValidationIssue::UnknownActiveSpecialist { name: name.clone() });
            }
        }
        issues
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            summary: self.summary(),
            tasks: self.backlog.tasks().to_vec(),
            files: self.files.entries().cloned().collect(),
            file_operations: self.files.operations().to_vec(),
            cache: self.cache.entries().cloned().collect(),
            specialists: self.specialists.records().cloned().collect(),
            active_specialists: self.active_specialists.clone(),
            delegation_history: self.delegation_history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload_from_value;
    use crate::specialists::EchoSpecialist;
    use serde_json::json;

    fn limits(max_iterations: u32) -> SessionLimits {
        SessionLimits {
            max_iterations,
            ..SessionLimits::default()
        }
    }

    #[test]
    fn test_new_state_defaults() {
        let state = SessionState::new(&SessionLimits::default());
        assert!(state.session_id().starts_with("session_"));
        assert_eq!(state.status(), AgentStatus::Initializing);
        assert!(state.validate().is_empty());
        let summary = state.summary();
        assert_eq!(summary.max_iterations, 50);
        assert_eq!(summary.task_count, 0);
    }

    #[test]
    fn test_mutation_refreshes_last_activity() {
        let mut state = SessionState::new(&SessionLimits::default());
        let before = state.last_activity();
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.add_task(NewTask::new("analyze AAPL"));
        assert!(state.last_activity() > before);
    }

    #[test]
    fn test_failed_mutation_keeps_last_activity() {
        let mut state = SessionState::new(&SessionLimits::default());
        let before = state.last_activity();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(state
            .update_task_status("todo_404", TaskStatus::Completed, Payload::new())
            .is_err());
        assert_eq!(state.last_activity(), before);
    }

    #[test]
    fn test_validate_orphan_scenario() {
        let mut state = SessionState::new(&SessionLimits::default());
        let t1 = state.add_task(NewTask::new("T1")).id;
        let t2 = state.add_task(NewTask::new("T2").depends_on(t1)).id;
        assert!(state.validate().is_empty());

        state.add_dependency(&t2, "T99").unwrap();
        let issues = state.validate();
        assert_eq!(issues.len(), 1);
        let msg = issues[0].to_string();
        assert!(msg.contains(&t2));
        assert!(msg.contains("T99"));
    }

    #[test]
    fn test_validate_iteration_limit() {
        let mut state = SessionState::new(&limits(2));
        state.advance_iteration().unwrap();
        assert!(state.validate().is_empty());
        state.advance_iteration().unwrap();
        assert_eq!(
            state.validate(),
            vec![ValidationIssue::IterationLimitReached { count: 2, max: 2 }]
        );
        // 不强制停止
        assert_eq!(state.advance_iteration().unwrap(), 3);
    }

    #[test]
    fn test_validate_unknown_active_specialist() {
        let mut state = SessionState::new(&SessionLimits::default());
        state.register_specialist("stock_analyst", "", vec![], Arc::new(EchoSpecialist::new("stock_analyst")));
        state.activate_specialist("stock_analyst");
        state.activate_specialist("ghost");
        let issues = state.validate();
        assert_eq!(
            issues,
            vec![ValidationIssue::UnknownActiveSpecialist { name: "ghost".to_string() }]
        );
        assert_eq!(issues[0].to_string(), "Active specialist ghost not found in specialist registry");
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let mut state = SessionState::new(&SessionLimits::default());
        let t = state.add_task(NewTask::new("T").depends_on("missing")).id;
        let before = state.last_activity();
        let _ = state.validate();
        let _ = state.validate();
        assert_eq!(state.last_activity(), before);
        assert_eq!(state.backlog().get(&t).unwrap().dependencies.len(), 1);
    }

    #[test]
    fn test_advance_iteration_leaves_initializing() {
        let mut state = SessionState::new(&SessionLimits::default());
        assert_eq!(state.advance_iteration().unwrap(), 1);
        assert_eq!(state.status(), AgentStatus::Planning);
        state.transition(AgentStatus::Executing).unwrap();
        state.advance_iteration().unwrap();
        assert_eq!(state.status(), AgentStatus::Executing);
    }

    #[test]
    fn test_terminal_status_rejects_changes() {
        let mut state = SessionState::new(&SessionLimits::default());
        state.transition(AgentStatus::Planning).unwrap();
        state.transition(AgentStatus::Summarizing).unwrap();
        state.transition(AgentStatus::Completed).unwrap();
        assert!(matches!(
            state.advance_iteration(),
            Err(SessionError::InvalidTransition { .. })
        ));
        assert_eq!(
            state.transition(AgentStatus::Planning).unwrap_err(),
            SessionError::InvalidTransition {
                from: AgentStatus::Completed,
                to: AgentStatus::Planning
            }
        );
    }

    #[test]
    fn test_illegal_transition() {
        let mut state = SessionState::new(&SessionLimits::default());
        assert!(state.transition(AgentStatus::Completed).is_err());
        assert!(state.transition(AgentStatus::Error).is_ok());
    }

    #[test]
    fn test_write_todos_adds_tasks() {
        let mut state = SessionState::new(&SessionLimits::default());
        let ids = state.write_todos("1. [HIGH] Pull prices\n2. Summarize");
        assert_eq!(ids.len(), 2);
        assert_eq!(state.summary().pending_tasks, 2);
    }

    #[test]
    fn test_summary_counts() {
        let mut state = SessionState::new(&SessionLimits::default());
        let a = state.add_task(NewTask::new("a")).id;
        state.add_task(NewTask::new("b"));
        state
            .update_task_status(&a, TaskStatus::InProgress, payload_from_value(json!({})))
            .unwrap();
        state.write_file("notes.md", "x", FileKind::File).unwrap();
        state.cache_put("AAPL", "price", payload_from_value(json!({"p": 1})), None);

        let summary = state.summary();
        assert_eq!(summary.task_count, 2);
        assert_eq!(summary.pending_tasks, 1);
        assert_eq!(summary.in_progress_tasks, 1);
        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.cache_size, 1);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["agent_status"], json!("initializing"));
    }
}
