//! 任务规划：TODO 任务、优先级、依赖与文本解析

pub mod backlog;
pub mod parse;
pub mod types;

pub use backlog::TaskBacklog;
pub use parse::{parse_todo_line, parse_todo_list};
pub use types::{NewTask, Priority, Task, TaskId, TaskStatus};
