//! 委派器：把任务描述路由给指定专家，记录状态与结果
//!
//! 流程：未注册 → SpecialistNotFound（附可用名单，不做兜底路由，不改注册表）；
//! 标记 working → 在超时与取消令牌下调用一次 → 成功标记 completed 并附结果，失败标记 error 并附诊断。
//! 委派器自身从不重试。调用在独立任务中执行并捕获 panic，调用方中途放弃或专家 panic 都不会让专家停留在 working。
//! 同一专家同一时间只接一个委派；排队等待许可的委派同样响应取消。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::core::{AgentStatus, Payload, SessionError, SessionState, SessionSupervisor, Workspace};
use crate::specialists::{SpecialistContext, SpecialistStatus};
use crate::todo::{TaskId, TaskStatus};
use crate::vfs::FileKind;

/// 委派请求
#[derive(Clone, Debug)]
pub struct DelegationRequest {
    pub specialist: String,
    pub task: String,
    /// 关联的待办任务：开始时 in_progress，成功 completed，失败回到 pending
    pub task_id: Option<TaskId>,
    /// 成功时把结果以 JSON 写入该文件
    pub artifact: Option<String>,
}

impl DelegationRequest {
    pub fn new(specialist: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            specialist: specialist.into(),
            task: task.into(),
            task_id: None,
            artifact: None,
        }
    }

    pub fn for_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn save_to(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// 委派历史记录
#[derive(Clone, Debug, Serialize)]
pub struct DelegationRecord {
    pub specialist: String,
    pub task: String,
    pub task_id: Option<TaskId>,
    pub status: DelegationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    /// 请求的结果文件；写入失败时 artifact_error 记录原因
    pub artifact: Option<String>,
    pub artifact_error: Option<String>,
}

enum Failure {
    Failed(String),
    TimedOut,
    Cancelled,
}

impl Failure {
    fn status(&self) -> DelegationStatus {
        match self {
            Failure::Failed(_) => DelegationStatus::Failed,
            Failure::TimedOut => DelegationStatus::TimedOut,
            Failure::Cancelled => DelegationStatus::Cancelled,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Failure::Failed(_) => "failure",
            Failure::TimedOut => "timeout",
            Failure::Cancelled => "cancelled",
        }
    }

    fn message(&self, timeout: Duration) -> String {
        match self {
            Failure::Failed(msg) => msg.clone(),
            Failure::TimedOut => format!("timed out after {}s", timeout.as_secs()),
            Failure::Cancelled => "cancelled".to_string(),
        }
    }

    fn into_error(self, name: &str, timeout: Duration) -> SessionError {
        match self {
            Failure::Failed(message) => SessionError::SpecialistFailed {
                name: name.to_string(),
                message,
            },
            Failure::TimedOut => SessionError::SpecialistTimeout {
                name: name.to_string(),
                secs: timeout.as_secs(),
            },
            Failure::Cancelled => SessionError::Cancelled(format!("delegation to '{name}'")),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 委派器：与所属会话共享同一把状态锁
#[derive(Clone)]
pub struct Delegator {
    state: Arc<Mutex<SessionState>>,
    supervisor: Arc<SessionSupervisor>,
    timeout: Duration,
}

impl Delegator {
    pub(crate) fn new(
        state: Arc<Mutex<SessionState>>,
        supervisor: Arc<SessionSupervisor>,
        timeout: Duration,
    ) -> Self {
        Self {
            state,
            supervisor,
            timeout,
        }
    }

    pub async fn delegate(&self, request: DelegationRequest) -> Result<Payload, SessionError> {
        let this = self.clone();
        let name = request.specialist.clone();
        tokio::spawn(async move { this.run(request).await })
            .await
            .map_err(|e| SessionError::SpecialistFailed {
                name,
                message: format!("delegation task aborted: {e}"),
            })?
    }

    pub async fn delegate_all(&self, requests: Vec<DelegationRequest>) -> Vec<Result<Payload, SessionError>> {
        join_all(requests.into_iter().map(|r| self.delegate(r))).await
    }

    fn not_found(state: &SessionState, name: &str) -> SessionError {
        SessionError::SpecialistNotFound {
            name: name.to_string(),
            available: state.specialists().names(),
        }
    }

    fn precheck(state: &SessionState, request: &DelegationRequest) -> Result<(), SessionError> {
        if !state.specialists().contains(&request.specialist) {
            return Err(Self::not_found(state, &request.specialist));
        }
        if let Some(id) = &request.task_id {
            if !state.backlog().contains(id) {
                return Err(SessionError::TaskNotFound(id.clone()));
            }
        }
        Ok(())
    }

    fn save_artifact(state: &mut SessionState, artifact: &str, payload: &Payload) -> Result<(), SessionError> {
        let content = serde_json::to_string_pretty(payload)
            .map_err(|e| SessionError::InvalidArgument(e.to_string()))?;
        state.write_file(artifact, content, FileKind::File)?;
        Ok(())
    }

    async fn run(&self, request: DelegationRequest) -> Result<Payload, SessionError> {
        let name = request.specialist.as_str();
        if let Err(e) = Self::precheck(&*self.state.lock().await, &request) {
            tracing::warn!(specialist = %name, error = %e, "delegation rejected");
            return Err(e);
        }

        // 先取令牌再排队，排队期间的取消同样生效
        let cancel = self.supervisor.child_token();
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(specialist = %name, "queued delegation cancelled");
                return Err(Failure::Cancelled.into_error(name, self.timeout));
            }
            permit = self.supervisor.acquire_slot() => permit?,
        };

        let (handle, started_at) = {
            let mut state = self.state.lock().await;
            // 等待许可期间注册表可能已变化，这里在同一把锁内重新检查
            Self::precheck(&state, &request)?;
            if state
                .specialists()
                .get(name)
                .is_some_and(|r| r.status == SpecialistStatus::Working)
            {
                tracing::warn!(specialist = %name, "delegation rejected, specialist busy");
                return Err(SessionError::SpecialistBusy(name.to_string()));
            }
            let handle = state
                .specialists()
                .handle(name)
                .ok_or_else(|| Self::not_found(&state, name))?;
            state.mark_specialist(name, SpecialistStatus::Working, None)?;
            state.activate_specialist(name);
            if let Some(id) = &request.task_id {
                state.assign_task(id, name)?;
                state.update_task_status(id, TaskStatus::InProgress, Payload::new())?;
            }
            if state.status().can_transition_to(AgentStatus::Delegating) {
                state.transition(AgentStatus::Delegating)?;
            }
            (handle, Utc::now())
        };

        tracing::info!(specialist = %name, task = %request.task, "delegating");
        let ctx = SpecialistContext {
            task: request.task.clone(),
            workspace: Workspace::new(self.state.clone()),
            cancel: cancel.clone(),
        };
        let invocation = AssertUnwindSafe(handle.invoke(ctx)).catch_unwind();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(Failure::Cancelled),
            res = tokio::time::timeout(self.timeout, invocation) => match res {
                Ok(Ok(Ok(payload))) => Ok(payload),
                Ok(Ok(Err(msg))) => Err(Failure::Failed(msg)),
                Ok(Err(panic)) => Err(Failure::Failed(format!(
                    "specialist panicked: {}",
                    panic_message(&*panic)
                ))),
                Err(_) => Err(Failure::TimedOut),
            },
        };

        let mut state = self.state.lock().await;
        state.deactivate_specialist(name);
        let result = match outcome {
            Ok(payload) => {
                state.mark_specialist(name, SpecialistStatus::Completed, Some(payload.clone()))?;
                let artifact_error = match &request.artifact {
                    Some(artifact) => Self::save_artifact(&mut state, artifact, &payload)
                        .err()
                        .map(|e| e.to_string()),
                    None => None,
                };
                if let Some(id) = &request.task_id {
                    let mut patch = Payload::new();
                    patch.insert("delegated_to".to_string(), name.into());
                    // 结果没落盘，任务退回 pending 等待重试
                    match &artifact_error {
                        None => state.update_task_status(id, TaskStatus::Completed, patch)?,
                        Some(reason) => {
                            patch.insert("last_error".to_string(), reason.clone().into());
                            state.update_task_status(id, TaskStatus::Pending, patch)?
                        }
                    };
                }
                state.record_delegation(DelegationRecord {
                    specialist: name.to_string(),
                    task: request.task.clone(),
                    task_id: request.task_id.clone(),
                    status: DelegationStatus::Completed,
                    started_at,
                    finished_at: Utc::now(),
                    error: None,
                    artifact: request.artifact.clone(),
                    artifact_error: artifact_error.clone(),
                });
                match (artifact_error, &request.artifact) {
                    (Some(reason), Some(artifact)) => {
                        tracing::warn!(specialist = %name, artifact = %artifact, error = %reason, "delegation result not saved");
                        Err(SessionError::ArtifactNotSaved {
                            artifact: artifact.clone(),
                            reason,
                        })
                    }
                    _ => {
                        tracing::info!(specialist = %name, "delegation completed");
                        Ok(payload)
                    }
                }
            }
            Err(failure) => {
                let message = failure.message(self.timeout);
                let mut diagnostic = Payload::new();
                diagnostic.insert("error".to_string(), message.clone().into());
                diagnostic.insert("kind".to_string(), failure.kind().into());
                state.mark_specialist(name, SpecialistStatus::Error, Some(diagnostic))?;
                if let Some(id) = &request.task_id {
                    let mut patch = Payload::new();
                    patch.insert("last_error".to_string(), message.clone().into());
                    state.update_task_status(id, TaskStatus::Pending, patch)?;
                }
                state.record_delegation(DelegationRecord {
                    specialist: name.to_string(),
                    task: request.task.clone(),
                    task_id: request.task_id.clone(),
                    status: failure.status(),
                    started_at,
                    finished_at: Utc::now(),
                    error: Some(message.clone()),
                    artifact: request.artifact.clone(),
                    artifact_error: None,
                });
                tracing::warn!(specialist = %name, kind = failure.kind(), error = %message, "delegation failed");
                Err(failure.into_error(name, self.timeout))
            }
        };

        if state.active_specialists().is_empty() && state.status() == AgentStatus::Delegating {
            state.transition(AgentStatus::Executing)?;
        }
        result
    }
}
