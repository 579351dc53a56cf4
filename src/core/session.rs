//! 会话句柄
//!
//! `Session` 把 SessionState 放在一把 tokio 互斥锁后面，是规划方与委派器修改状态的唯一入口；
//! `Workspace` 是交给专家的收窄视图，只能通过同一把锁读写任务、文件与缓存。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cache::LookupSource;
use crate::config::AppConfig;
use crate::core::{
    AgentStatus, Payload, SessionError, SessionLimits, SessionSnapshot, SessionState,
    SessionSummary, SessionSupervisor, ValidationIssue,
};
use crate::specialists::{DelegationRequest, Delegator, Specialist, SpecialistRecord};
use crate::todo::{NewTask, Task, TaskId, TaskStatus};
use crate::vfs::{FileEntry, FileKind};

/// 任务 / 文件 / 缓存的同步访问句柄
#[derive(Clone)]
pub struct Workspace {
    state: Arc<Mutex<SessionState>>,
}

impl Workspace {
    pub(crate) fn new(state: Arc<Mutex<SessionState>>) -> Self {
        Self { state }
    }

    pub async fn add_task(&self, new: NewTask) -> Task {
        self.state.lock().await.add_task(new)
    }

    pub async fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        metadata_patch: Payload,
    ) -> Result<Task, SessionError> {
        self.state.lock().await.update_task_status(id, status, metadata_patch)
    }

    pub async fn task(&self, id: &str) -> Option<Task> {
        self.state.lock().await.backlog().get(id).cloned()
    }

    pub async fn write_file(
        &self,
        name: &str,
        content: impl Into<String>,
        kind: FileKind,
    ) -> Result<FileEntry, SessionError> {
        self.state.lock().await.write_file(name, content, kind)
    }

    pub async fn read_file(&self, name: &str) -> Option<String> {
        self.state.lock().await.read_file(name)
    }

    pub async fn edit_file(&self, name: &str, search: &str, replace: &str) -> Result<usize, SessionError> {
        self.state.lock().await.edit_file(name, search, replace)
    }

    pub async fn list_files(&self, directory: Option<&str>) -> Vec<String> {
        self.state.lock().await.list_files(directory)
    }

    pub async fn cache_put(&self, subject: &str, kind: &str, payload: Payload, ttl: Option<Duration>) {
        self.state.lock().await.cache_put(subject, kind, payload, ttl);
    }

    pub async fn cache_get(&self, subject: &str, kind: &str) -> Option<Payload> {
        self.state.lock().await.cache_get(subject, kind)
    }

    /// 缓存优先的外部查询：命中直接返回；未命中或过期时调用一次 source.fetch，成功则按默认 TTL 缓存。
    /// 失败原样作为 TransientFailure 返回，不重试、不缓存。查询期间不持有锁。
    pub async fn cached_lookup(
        &self,
        subject: &str,
        kind: &str,
        source: &dyn LookupSource,
    ) -> Result<Payload, SessionError> {
        let cached = self.state.lock().await.cache_get(subject, kind);
        if let Some(hit) = cached {
            tracing::debug!(subject = %subject, kind = %kind, "cache hit");
            return Ok(hit);
        }
        let payload = source.fetch(subject, kind).await.map_err(|e| {
            tracing::warn!(subject = %subject, kind = %kind, error = %e, "lookup failed");
            SessionError::TransientFailure(e)
        })?;
        self.state
            .lock()
            .await
            .cache_put(subject, kind, payload.clone(), None);
        Ok(payload)
    }
}

/// 单个会话：状态 + 监管 + 委派器
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    workspace: Workspace,
    supervisor: Arc<SessionSupervisor>,
    delegator: Delegator,
}

impl Session {
    pub fn new(cfg: &AppConfig) -> Self {
        Self::from_state(SessionState::new(&SessionLimits::from(cfg)), cfg)
    }

    /// 用已有状态构建（如指定 session_id 或自定义限额）
    pub fn from_state(state: SessionState, cfg: &AppConfig) -> Self {
        tracing::info!(session_id = %state.session_id(), "session created");
        let state = Arc::new(Mutex::new(state));
        let supervisor = Arc::new(SessionSupervisor::new(cfg.delegation.max_concurrent));
        let delegator = Delegator::new(
            state.clone(),
            supervisor.clone(),
            Duration::from_secs(cfg.delegation.timeout_secs),
        );
        Self {
            workspace: Workspace::new(state.clone()),
            state,
            supervisor,
            delegator,
        }
    }

    pub fn workspace(&self) -> Workspace {
        self.workspace.clone()
    }

    /// 在锁内对状态执行一次闭包
    pub async fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    pub async fn session_id(&self) -> String {
        self.state.lock().await.session_id().to_string()
    }

    // ---- 任务 ----

    pub async fn add_task(&self, new: NewTask) -> Task {
        self.workspace.add_task(new).await
    }

    pub async fn write_todos(&self, text: &str) -> Vec<TaskId> {
        self.state.lock().await.write_todos(text)
    }

    pub async fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        metadata_patch: Payload,
    ) -> Result<Task, SessionError> {
        self.workspace.update_task_status(id, status, metadata_patch).await
    }

    pub async fn add_dependency(&self, id: &str, dep_id: &str) -> Result<Task, SessionError> {
        self.state.lock().await.add_dependency(id, dep_id)
    }

    pub async fn task(&self, id: &str) -> Option<Task> {
        self.workspace.task(id).await
    }

    pub async fn next_ready_task(&self) -> Option<Task> {
        self.state.lock().await.next_ready_task().cloned()
    }

    // ---- 文件 ----

    pub async fn write_file(
        &self,
        name: &str,
        content: impl Into<String>,
        kind: FileKind,
    ) -> Result<FileEntry, SessionError> {
        self.workspace.write_file(name, content, kind).await
    }

    pub async fn read_file(&self, name: &str) -> Option<String> {
        self.workspace.read_file(name).await
    }

    pub async fn edit_file(&self, name: &str, search: &str, replace: &str) -> Result<usize, SessionError> {
        self.workspace.edit_file(name, search, replace).await
    }

    pub async fn list_files(&self, directory: Option<&str>) -> Vec<String> {
        self.workspace.list_files(directory).await
    }

    // ---- 缓存 ----

    pub async fn cache_put(&self, subject: &str, kind: &str, payload: Payload, ttl: Option<Duration>) {
        self.workspace.cache_put(subject, kind, payload, ttl).await
    }

    pub async fn cache_get(&self, subject: &str, kind: &str) -> Option<Payload> {
        self.workspace.cache_get(subject, kind).await
    }

    pub async fn cached_lookup(
        &self,
        subject: &str,
        kind: &str,
        source: &dyn LookupSource,
    ) -> Result<Payload, SessionError> {
        self.workspace.cached_lookup(subject, kind, source).await
    }

    // ---- 专家与委派 ----

    pub async fn register_specialist(
        &self,
        name: &str,
        description: &str,
        capabilities: Vec<String>,
        handle: Arc<dyn Specialist>,
    ) -> SpecialistRecord {
        self.state
            .lock()
            .await
            .register_specialist(name, description, capabilities, handle)
    }

    pub async fn specialist(&self, name: &str) -> Option<SpecialistRecord> {
        self.state.lock().await.specialists().get(name).cloned()
    }

    /// 单次委派；不重试，重试与退避由调用方决定
    pub async fn delegate(&self, request: DelegationRequest) -> Result<Payload, SessionError> {
        self.delegator.delegate(request).await
    }

    /// 并发委派多个请求并等待全部结束，结果与请求一一对应（并发度受 delegation.max_concurrent 限制）
    pub async fn delegate_all(&self, requests: Vec<DelegationRequest>) -> Vec<Result<Payload, SessionError>> {
        self.delegator.delegate_all(requests).await
    }

    /// 取消所有进行中的委派
    pub fn cancel_delegations(&self) {
        self.supervisor.cancel();
    }

    // ---- 生命周期与诊断 ----

    pub async fn advance_iteration(&self) -> Result<u32, SessionError> {
        self.state.lock().await.advance_iteration()
    }

    pub async fn transition(&self, to: AgentStatus) -> Result<(), SessionError> {
        self.state.lock().await.transition(to)
    }

    pub async fn summary(&self) -> SessionSummary {
        self.state.lock().await.summary()
    }

    pub async fn validate(&self) -> Vec<ValidationIssue> {
        self.state.lock().await.validate()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload_from_value;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LookupSource for CountingSource {
        async fn fetch(&self, subject: &str, kind: &str) -> Result<Payload, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("status: rate_limited".to_string());
            }
            Ok(payload_from_value(json!({"subject": subject, "kind": kind, "p": 100})))
        }
    }

    #[tokio::test]
    async fn test_cached_lookup_fetches_once() {
        let session = Session::new(&AppConfig::default());
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let first = session.cached_lookup("AAPL", "price", &source).await.unwrap();
        let second = session.cached_lookup("AAPL", "price", &source).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.summary().await.cache_size, 1);
    }

    #[tokio::test]
    async fn test_cached_lookup_surfaces_transient_failure() {
        let session = Session::new(&AppConfig::default());
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let err = session.cached_lookup("AAPL", "price", &source).await.unwrap_err();
        assert_eq!(err, SessionError::TransientFailure("status: rate_limited".to_string()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.summary().await.cache_size, 0);
    }

    #[tokio::test]
    async fn test_workspace_shares_state() {
        let session = Session::new(&AppConfig::default());
        let ws = session.workspace();
        ws.write_file("/analysis/aapl.json", "{\"rec\":\"BUY\"}", FileKind::File)
            .await
            .unwrap();
        assert_eq!(
            session.read_file("analysis/aapl.json").await.as_deref(),
            Some("{\"rec\":\"BUY\"}")
        );
        assert_eq!(session.list_files(Some("analysis")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_with_state_runs_under_lock() {
        let session = Session::new(&AppConfig::default());
        session.add_task(NewTask::new("T1")).await;
        let count = session.with_state(|s| s.backlog().len()).await;
        assert_eq!(count, 1);
    }
}
