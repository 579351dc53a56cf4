//! 会话错误类型
//!
//! 所有变更类操作要么成功并刷新 last_activity，要么返回这里的某一种错误；不存在「部分生效」。
//! 结构性问题（孤立依赖、失效的活跃专家、迭代上限）不是错误，由 `validate()` 以 ValidationIssue 列表报告。

use thiserror::Error;

use crate::core::AgentStatus;

/// 会话运行过程中可能出现的错误（未找到、数据源瞬时失败、委派失败、限额、工具调用等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    /// 委派目标未注册；只影响本次委派，不影响会话
    #[error("Specialist '{name}' not found. Available specialists: {available:?}")]
    SpecialistNotFound { name: String, available: Vec<String> },

    /// 底层数据源失败或被限流；核心层从不自动重试，原样交给调用方决定退避
    #[error("Transient failure: {0}")]
    TransientFailure(String),

    #[error("Specialist '{name}' failed: {message}")]
    SpecialistFailed { name: String, message: String },

    #[error("Specialist '{name}' timed out after {secs}s")]
    SpecialistTimeout { name: String, secs: u64 },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// 同一专家同一时间只处理一个委派
    #[error("Specialist '{0}' is busy with another delegation")]
    SpecialistBusy(String),

    /// 专家已完成，但结果未能写入指定文件
    #[error("Delegation result not saved to '{artifact}': {reason}")]
    ArtifactNotSaved { artifact: String, reason: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: AgentStatus, to: AgentStatus },

    #[error("File '{name}' is {size} bytes, limit is {limit}")]
    FileTooLarge { name: String, size: usize, limit: usize },

    #[error("File limit reached ({0} files)")]
    FileLimitReached(usize),

    #[error("Text to replace not found in '{0}'")]
    SearchTextNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 规划方调用了未注册的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),
}

impl SessionError {
    /// 是否属于 NotFound 类（任务 / 文件 / 专家）
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::TaskNotFound(_)
                | SessionError::FileNotFound(_)
                | SessionError::SpecialistNotFound { .. }
        )
    }
}
