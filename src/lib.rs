//! DeepAgent - 长程分析智能体的会话核心
//!
//! 模块划分：
//! - **cache**: 按 (subject, kind) 存储、带 TTL 的过期缓存与缓存优先查询的数据源 trait
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、会话状态、会话句柄与监管（取消 / 并发许可）
//! - **observability**: tracing 订阅器初始化
//! - **specialists**: 专家注册表与委派器
//! - **todo**: 带依赖与优先级的任务积压
//! - **tools**: 规划方工具面（Tool / ToolRegistry / ToolExecutor）
//! - **vfs**: 会话内虚拟文件存储

pub mod cache;
pub mod config;
pub mod core;
pub mod observability;
pub mod specialists;
pub mod todo;
pub mod tools;
pub mod vfs;

pub use crate::core::{Session, SessionError};
