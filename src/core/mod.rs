//! 核心层：错误、会话状态、会话句柄与监管

pub mod error;
pub mod payload;
pub mod session;
pub mod state;
pub mod supervisor;

pub use error::SessionError;
pub use payload::{merge_shallow, payload_from_value, Payload};
pub use session::{Session, Workspace};
pub use state::{AgentStatus, SessionLimits, SessionSnapshot, SessionState, SessionSummary, ValidationIssue};
pub use supervisor::SessionSupervisor;
