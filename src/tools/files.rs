//! 虚拟文件工具：write_file / read_file / edit_file / list_files

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{Session, SessionError};
use crate::tools::registry::{optional_str, required_str, to_json};
use crate::tools::Tool;
use crate::vfs::FileKind;

pub struct WriteFileTool {
    session: Session,
}

impl WriteFileTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a virtual file. Args: {\"file_path\": \"analysis/aapl.md\", \"content\": \"...\", \"kind\": \"file|directory\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "content": {"type": "string"},
                "kind": {"type": "string", "enum": ["file", "directory"]}
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = required_str(&args, "file_path")?;
        let content = required_str(&args, "content")?;
        let kind = match optional_str(&args, "kind") {
            Some(k) => serde_json::from_value::<FileKind>(Value::String(k.to_string()))
                .map_err(|_| format!("Invalid file kind: {k}"))?,
            None => FileKind::File,
        };
        let entry = self
            .session
            .write_file(path, content, kind)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&json!({"name": entry.name, "size": entry.size, "updated_at": entry.updated_at}))
    }
}

pub struct ReadFileTool {
    session: Session,
}

impl ReadFileTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a virtual file's content. Args: {\"file_path\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"file_path": {"type": "string"}},
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = required_str(&args, "file_path")?;
        self.session
            .read_file(path)
            .await
            .ok_or_else(|| SessionError::FileNotFound(path.to_string()).to_string())
    }
}

pub struct EditFileTool {
    session: Session,
}

impl EditFileTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace every occurrence of old_string in a virtual file. Args: {\"file_path\": \"...\", \"old_string\": \"...\", \"new_string\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "old_string": {"type": "string"},
                "new_string": {"type": "string"}
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = required_str(&args, "file_path")?;
        let old = required_str(&args, "old_string")?;
        let new = required_str(&args, "new_string")?;
        let replaced = self
            .session
            .edit_file(path, old, new)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&json!({"name": path, "replacements": replaced}))
    }
}

pub struct ListFilesTool {
    session: Session,
}

impl ListFilesTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List virtual file names, optionally under a directory. Args: {\"directory\": \"analysis\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"directory": {"type": "string"}},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let names = self.session.list_files(optional_str(&args, "directory")).await;
        to_json(&names)
    }
}
