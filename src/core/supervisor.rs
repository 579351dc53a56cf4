//! 会话监管：委派的取消与并发许可
//!
//! 持有会话级 CancellationToken（每次委派取子 token）与委派并发信号量（默认 1，即串行）。
//! cancel() 取消所有进行中的委派后换上新的 token，之后的委派不受影响。

use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::SessionError;

/// 会话级生命周期管理：取消令牌与并发许可
#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: Mutex<CancellationToken>,
    /// 同时运行的专家数上限
    slots: Arc<Semaphore>,
}

impl SessionSupervisor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            cancel_token: Mutex::new(CancellationToken::new()),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    fn current(&self) -> CancellationToken {
        self.cancel_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 创建子 token（用于单次委派）
    pub fn child_token(&self) -> CancellationToken {
        self.current().child_token()
    }

    /// 取消所有进行中的委派
    pub fn cancel(&self) {
        let mut token = self
            .cancel_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        token.cancel();
        *token = CancellationToken::new();
        tracing::info!("in-flight delegations cancelled");
    }

    /// 获取委派许可
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, SessionError> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SessionError::Cancelled("delegation slots closed".to_string()))
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new(1)
    }
}
