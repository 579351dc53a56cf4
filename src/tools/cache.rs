//! 缓存工具：cache_put / cache_get

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{payload_from_value, Session};
use crate::tools::registry::{required_str, to_json};
use crate::tools::Tool;

pub struct CachePutTool {
    session: Session,
}

impl CachePutTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for CachePutTool {
    fn name(&self) -> &str {
        "cache_put"
    }

    fn description(&self) -> &str {
        "Cache a lookup result. Args: {\"subject\": \"AAPL\", \"kind\": \"price\", \"payload\": {..}, \"ttl_secs\": 900}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": {"type": "string"},
                "kind": {"type": "string"},
                "payload": {"type": "object"},
                "ttl_secs": {"type": "integer", "minimum": 0}
            },
            "required": ["subject", "kind", "payload"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let subject = required_str(&args, "subject")?;
        let kind = required_str(&args, "kind")?;
        let payload = args
            .get("payload")
            .cloned()
            .map(payload_from_value)
            .ok_or_else(|| "Missing required argument: payload".to_string())?;
        let ttl = args
            .get("ttl_secs")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs);
        self.session.cache_put(subject, kind, payload, ttl).await;
        to_json(&json!({"cached": true, "subject": subject, "kind": kind}))
    }
}

pub struct CacheGetTool {
    session: Session,
}

impl CacheGetTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for CacheGetTool {
    fn name(&self) -> &str {
        "cache_get"
    }

    fn description(&self) -> &str {
        "Get a fresh cached payload, or null when absent or expired. Args: {\"subject\": \"AAPL\", \"kind\": \"price\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": {"type": "string"},
                "kind": {"type": "string"}
            },
            "required": ["subject", "kind"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let subject = required_str(&args, "subject")?;
        let kind = required_str(&args, "kind")?;
        to_json(&self.session.cache_get(subject, kind).await)
    }
}
