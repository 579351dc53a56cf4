//! VirtualFs：名称 → FileEntry 的存储与操作日志
//!
//! 名称先规范化（去掉前导 `/` 与 `./`）；写入前检查文件数与单文件大小上限，检查失败不产生任何变更。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Payload, SessionError};

/// 条目类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Directory,
}

/// 单个文件条目；size 恒等于最后一次写入时内容的字节长度
#[derive(Clone, Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub content: String,
    pub kind: FileKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size: usize,
    pub metadata: Payload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOpKind {
    Write,
    Read,
    Edit,
}

/// 操作日志记录；读操作不带 size
#[derive(Clone, Debug, Serialize)]
pub struct FileOp {
    pub op: FileOpKind,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// 虚拟文件系统
#[derive(Clone, Debug)]
pub struct VirtualFs {
    files: BTreeMap<String, FileEntry>,
    log: Vec<FileOp>,
    max_files: usize,
    max_file_size: usize,
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new(100, 1024 * 1024)
    }
}

/// 去掉前导 `/`、`./` 与末尾 `/`
pub fn normalize_name(name: &str) -> String {
    let mut name = name.trim();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    name.trim_end_matches('/').to_string()
}

impl VirtualFs {
    pub fn new(max_files: usize, max_file_size: usize) -> Self {
        Self {
            files: BTreeMap::new(),
            log: Vec::new(),
            max_files,
            max_file_size,
        }
    }

    /// 创建或整体替换条目（保留原 created_at），追加一条 write 日志
    pub fn write(
        &mut self,
        name: &str,
        content: impl Into<String>,
        kind: FileKind,
    ) -> Result<&FileEntry, SessionError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(SessionError::InvalidArgument("file name is empty".to_string()));
        }
        let content = content.into();
        let size = content.len();
        if size > self.max_file_size {
            return Err(SessionError::FileTooLarge {
                name,
                size,
                limit: self.max_file_size,
            });
        }
        if !self.files.contains_key(&name) && self.files.len() >= self.max_files {
            return Err(SessionError::FileLimitReached(self.max_files));
        }

        let now = Utc::now();
        let created_at = self.files.get(&name).map(|f| f.created_at).unwrap_or(now);
        let entry = FileEntry {
            name: name.clone(),
            content,
            kind,
            created_at,
            updated_at: now,
            size,
            metadata: Payload::new(),
        };
        self.log.push(FileOp {
            op: FileOpKind::Write,
            name: name.clone(),
            timestamp: now,
            size: Some(size),
        });
        tracing::info!(name = %name, size, "file written");
        self.files.insert(name.clone(), entry);
        self.files.get(&name).ok_or(SessionError::FileNotFound(name))
    }

    /// 读取内容；命中时追加 read 日志，未命中返回 None 且不记日志
    pub fn read(&mut self, name: &str) -> Option<String> {
        let name = normalize_name(name);
        let content = self.files.get(&name)?.content.clone();
        self.log.push(FileOp {
            op: FileOpKind::Read,
            name,
            timestamp: Utc::now(),
            size: None,
        });
        Some(content)
    }

    /// 将 search 的所有出现替换为 replace，返回替换次数
    pub fn edit(&mut self, name: &str, search: &str, replace: &str) -> Result<usize, SessionError> {
        let name = normalize_name(name);
        if search.is_empty() {
            return Err(SessionError::InvalidArgument("search text is empty".to_string()));
        }
        let entry = self
            .files
            .get(&name)
            .ok_or_else(|| SessionError::FileNotFound(name.clone()))?;
        let count = entry.content.matches(search).count();
        if count == 0 {
            return Err(SessionError::SearchTextNotFound(name));
        }
        let content = entry.content.replace(search, replace);
        let size = content.len();
        if size > self.max_file_size {
            return Err(SessionError::FileTooLarge {
                name,
                size,
                limit: self.max_file_size,
            });
        }

        let now = Utc::now();
        if let Some(entry) = self.files.get_mut(&name) {
            entry.content = content;
            entry.size = size;
            entry.updated_at = now;
        }
        self.log.push(FileOp {
            op: FileOpKind::Edit,
            name,
            timestamp: now,
            size: Some(size),
        });
        Ok(count)
    }

    /// 列出名称（有序）。None / "" / "/" 列出全部，否则只列出 `dir/` 之下的名称
    pub fn list(&self, directory: Option<&str>) -> Vec<String> {
        let prefix = directory.map(normalize_name).unwrap_or_default();
        if prefix.is_empty() {
            return self.files.keys().cloned().collect();
        }
        let prefix = format!("{prefix}/");
        self.files
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(&normalize_name(name))
    }

    /// 合并条目元数据
    pub fn update_metadata(&mut self, name: &str, patch: Payload) -> Result<(), SessionError> {
        let name = normalize_name(name);
        let entry = self
            .files
            .get_mut(&name)
            .ok_or(SessionError::FileNotFound(name))?;
        crate::core::merge_shallow(&mut entry.metadata, patch);
        entry.updated_at = Utc::now();
        Ok(())
    }

    pub fn operations(&self) -> &[FileOp] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }
}
