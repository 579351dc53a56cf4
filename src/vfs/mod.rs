//! 虚拟文件系统：会话内的中间产物（分析结果、报告、笔记）
//!
//! 名称即键，可用 `/` 编码层级；所有写 / 读 / 编辑都会追加到只增不减的操作日志（仅用于诊断）。

pub mod store;

pub use store::{FileEntry, FileKind, FileOp, FileOpKind, VirtualFs};
