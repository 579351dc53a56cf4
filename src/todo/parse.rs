//! TODO 列表文本解析
//!
//! 规划方常以编号列表一次性写出计划，如 `1. [HIGH] Pull AAPL fundamentals`。
//! 每个非空行成为一个任务；编号 / 项目符号前缀被去掉，`[LOW]/[MEDIUM]/[HIGH]/[URGENT]`（不区分大小写）决定优先级。

use std::sync::OnceLock;

use regex::Regex;

use crate::todo::types::{NewTask, Priority};

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+[.)]|[-*•])\s*").expect("valid bullet regex"))
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[(low|medium|high|urgent)\]").expect("valid marker regex"))
}

/// 解析单行；空行（或去掉前缀、标记后为空）返回 None
pub fn parse_todo_line(line: &str) -> Option<NewTask> {
    let line = line.trim();
    let line = bullet_re().replace(line, "");

    // 同一行出现多个标记时取最高优先级
    let priority = marker_re()
        .captures_iter(&line)
        .filter_map(|c| c.get(1)?.as_str().parse::<Priority>().ok())
        .max()
        .unwrap_or_default();

    let description = marker_re().replace_all(&line, "");
    let description = description.split_whitespace().collect::<Vec<_>>().join(" ");
    if description.is_empty() {
        return None;
    }
    Some(NewTask::new(description).priority(priority))
}

/// 解析整段 TODO 文本
pub fn parse_todo_list(text: &str) -> Vec<NewTask> {
    text.lines().filter_map(parse_todo_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_list_with_markers() {
        let text = "1. [HIGH] Pull AAPL fundamentals\n\n2. Compare with sector peers\n3) [urgent] Check risk metrics [LOW]\n- [Low] Draft summary";
        let tasks = parse_todo_list(text);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].description, "Pull AAPL fundamentals");
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[1].description, "Compare with sector peers");
        assert_eq!(tasks[1].priority, Priority::Medium);
        assert_eq!(tasks[2].description, "Check risk metrics");
        assert_eq!(tasks[2].priority, Priority::Urgent);
        assert_eq!(tasks[3].description, "Draft summary");
        assert_eq!(tasks[3].priority, Priority::Low);
    }

    #[test]
    fn test_marker_only_line_is_skipped() {
        assert!(parse_todo_line("  [HIGH]  ").is_none());
        assert!(parse_todo_line("").is_none());
    }

    #[test]
    fn test_numbers_inside_text_are_kept() {
        let task = parse_todo_line("10. Review Q3 2024 results").unwrap();
        assert_eq!(task.description, "Review Q3 2024 results");
    }
}
