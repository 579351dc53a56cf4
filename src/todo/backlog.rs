//! 任务待办：有序任务集合 + 依赖边
//!
//! 任务只增不删；依赖 ID 不在添加时校验，悬空引用只由 `orphaned_dependencies` 检出，不会被自动修复。

use std::collections::HashMap;

use chrono::Utc;

use crate::core::{merge_shallow, Payload, SessionError};
use crate::todo::types::{NewTask, Task, TaskId, TaskStatus};

/// 任务待办
#[derive(Debug, Clone, Default)]
pub struct TaskBacklog {
    tasks: Vec<Task>,
}

impl TaskBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增任务（status = pending），返回新任务
    ///
    /// ID 形如 `todo_{序号}_{HHMMSS}`：序号随任务数单调递增，任务又从不删除，因此会话内不会重复。
    pub fn add(&mut self, new: NewTask) -> &Task {
        let now = Utc::now();
        let id = format!("todo_{}_{}", self.tasks.len() + 1, now.format("%H%M%S"));
        let task = Task {
            id,
            description: new.description,
            status: TaskStatus::Pending,
            priority: new.priority,
            created_at: now,
            updated_at: now,
            assignee: new.assignee,
            dependencies: new.dependencies.into_iter().collect(),
            metadata: Payload::new(),
        };
        tracing::info!(id = %task.id, priority = %task.priority, "task added");
        self.tasks.push(task);
        &self.tasks[self.tasks.len() - 1]
    }

    /// 更新状态并浅合并元数据（patch 覆盖同名键）；不改动 id / 描述 / 依赖
    pub fn update_status(
        &mut self,
        id: &str,
        status: TaskStatus,
        metadata_patch: Payload,
    ) -> Result<&Task, SessionError> {
        let task = self.get_mut(id)?;
        task.status = status;
        task.updated_at = Utc::now();
        merge_shallow(&mut task.metadata, metadata_patch);
        tracing::info!(id = %id, status = %status, "task status updated");
        Ok(task)
    }

    /// 设置执行者
    pub fn assign(&mut self, id: &str, assignee: &str) -> Result<&Task, SessionError> {
        let task = self.get_mut(id)?;
        task.assignee = Some(assignee.to_string());
        task.updated_at = Utc::now();
        Ok(task)
    }

    /// 给任务追加依赖；不校验 dep_id 是否存在
    pub fn add_dependency(&mut self, id: &str, dep_id: &str) -> Result<&Task, SessionError> {
        let task = self.get_mut(id)?;
        task.dependencies.insert(dep_id.to_string());
        task.updated_at = Utc::now();
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Task, SessionError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| SessionError::TaskNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// 按添加顺序
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// 所有 (任务 ID, 悬空依赖 ID)
    pub fn orphaned_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        self.tasks
            .iter()
            .flat_map(|task| {
                task.dependencies
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .map(|dep| (task.id.clone(), dep.clone()))
            })
            .collect()
    }

    /// 下一个可执行任务：pending 且所有依赖都已存在并 completed；
    /// 优先级最高者胜出，同优先级取最早添加的
    pub fn next_ready(&self) -> Option<&Task> {
        let status: HashMap<&str, TaskStatus> =
            self.tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();
        let mut best: Option<&Task> = None;
        for task in &self.tasks {
            if task.status != TaskStatus::Pending {
                continue;
            }
            let ready = task
                .dependencies
                .iter()
                .all(|dep| status.get(dep.as_str()) == Some(&TaskStatus::Completed));
            if !ready {
                continue;
            }
            match best {
                Some(b) if b.priority >= task.priority => {}
                _ => best = Some(task),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload_from_value;
    use crate::todo::types::Priority;
    use serde_json::json;

    #[test]
    fn test_add_generates_fresh_ids() {
        let mut backlog = TaskBacklog::new();
        let a = backlog.add(NewTask::new("fetch prices")).id.clone();
        let b = backlog.add(NewTask::new("fetch prices")).id.clone();
        assert_ne!(a, b);
        assert!(a.starts_with("todo_1_"));
        assert!(b.starts_with("todo_2_"));
        assert_eq!(backlog.get(&a).unwrap().status, TaskStatus::Pending);
        assert_eq!(backlog.get(&a).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn test_update_status_keeps_identity() {
        let mut backlog = TaskBacklog::new();
        let t1 = backlog.add(NewTask::new("base")).id.clone();
        let t2 = backlog
            .add(NewTask::new("analyze AAPL").depends_on(t1.clone()))
            .id
            .clone();
        backlog
            .update_status(&t2, TaskStatus::InProgress, payload_from_value(json!({"note": "a", "k": 1})))
            .unwrap();
        let task = backlog
            .update_status(&t2, TaskStatus::Completed, payload_from_value(json!({"note": "b"})))
            .unwrap();

        assert_eq!(task.id, t2);
        assert_eq!(task.description, "analyze AAPL");
        assert_eq!(task.dependencies.iter().cloned().collect::<Vec<_>>(), vec![t1]);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.metadata["note"], json!("b"));
        assert_eq!(task.metadata["k"], json!(1));
    }

    #[test]
    fn test_update_unknown_task_is_not_found() {
        let mut backlog = TaskBacklog::new();
        let err = backlog
            .update_status("todo_99", TaskStatus::Completed, Payload::new())
            .unwrap_err();
        assert_eq!(err, SessionError::TaskNotFound("todo_99".to_string()));
    }

    #[test]
    fn test_orphaned_dependencies() {
        let mut backlog = TaskBacklog::new();
        let t1 = backlog.add(NewTask::new("T1")).id.clone();
        let t2 = backlog.add(NewTask::new("T2").depends_on(t1)).id.clone();
        assert!(backlog.orphaned_dependencies().is_empty());

        backlog.add_dependency(&t2, "T99").unwrap();
        assert_eq!(backlog.orphaned_dependencies(), vec![(t2, "T99".to_string())]);
    }

    #[test]
    fn test_next_ready_respects_dependencies_and_priority() {
        let mut backlog = TaskBacklog::new();
        let gather = backlog.add(NewTask::new("gather data")).id.clone();
        let report = backlog
            .add(NewTask::new("write report").priority(Priority::Urgent).depends_on(gather.clone()))
            .id
            .clone();
        let risk = backlog
            .add(NewTask::new("risk metrics").priority(Priority::High))
            .id
            .clone();

        assert_eq!(backlog.next_ready().unwrap().id, risk);
        backlog.update_status(&risk, TaskStatus::Completed, Payload::new()).unwrap();
        assert_eq!(backlog.next_ready().unwrap().id, gather);
        backlog.update_status(&gather, TaskStatus::Completed, Payload::new()).unwrap();
        assert_eq!(backlog.next_ready().unwrap().id, report);
        backlog.update_status(&report, TaskStatus::Completed, Payload::new()).unwrap();
        assert!(backlog.next_ready().is_none());
    }

    #[test]
    fn test_next_ready_ties_go_to_earliest() {
        let mut backlog = TaskBacklog::new();
        let first = backlog.add(NewTask::new("first")).id.clone();
        backlog.add(NewTask::new("second"));
        assert_eq!(backlog.next_ready().unwrap().id, first);
    }

    #[test]
    fn test_dangling_dependency_blocks_task() {
        let mut backlog = TaskBacklog::new();
        backlog.add(NewTask::new("blocked").depends_on("todo_404"));
        assert!(backlog.next_ready().is_none());
    }

    #[test]
    fn test_count_by_status() {
        let mut backlog = TaskBacklog::new();
        let a = backlog.add(NewTask::new("a")).id.clone();
        backlog.add(NewTask::new("b"));
        backlog.update_status(&a, TaskStatus::Cancelled, Payload::new()).unwrap();
        assert_eq!(backlog.count_by_status(TaskStatus::Pending), 1);
        assert_eq!(backlog.count_by_status(TaskStatus::Cancelled), 1);
        assert_eq!(backlog.len(), 2);
    }
}
