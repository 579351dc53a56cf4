//! 过期缓存：按 (subject, kind) 缓存昂贵的外部查询结果
//!
//! 惰性过期：只有读到过期条目时才顺带删除，没有后台清扫。
//! 已知限制：写入后再也不读的过期条目会一直占用内存，直到被同键覆盖。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::Payload;

/// 未指定 TTL 时的默认值（15 分钟）
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// 外部查询能力：fetch(subject, kind)，可能瞬时失败（限流、网络）
///
/// 只在缓存未命中或已过期时被调用；返回 Err 时不会被缓存，也不会被重试。
#[async_trait]
pub trait LookupSource: Send + Sync {
    async fn fetch(&self, subject: &str, kind: &str) -> Result<Payload, String>;
}

/// 复合键 (subject, kind)，如 ("AAPL", "price")
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub subject: String,
    pub kind: String,
}

impl CacheKey {
    pub fn new(subject: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            kind: kind.into(),
        }
    }
}

/// 单条缓存
#[derive(Clone, Debug, Serialize)]
pub struct CacheEntry {
    pub subject: String,
    pub kind: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// 仅当 now < expires_at 时可见
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// 过期缓存
#[derive(Clone, Debug)]
pub struct ExpiringCache {
    entries: HashMap<CacheKey, CacheEntry>,
    default_ttl: Duration,
}

impl Default for ExpiringCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ExpiringCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 写入或覆盖；ttl 为 None 时使用默认 TTL
    pub fn put(&mut self, subject: &str, kind: &str, payload: Payload, ttl: Option<Duration>) {
        self.put_at(subject, kind, payload, ttl, Utc::now());
    }

    pub fn put_at(
        &mut self,
        subject: &str,
        kind: &str,
        payload: Payload,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            subject: subject.to_string(),
            kind: kind.to_string(),
            payload,
            created_at: now,
            expires_at,
        };
        self.entries.insert(CacheKey::new(subject, kind), entry);
    }

    /// 读取未过期的载荷；读到过期条目时删除并返回 None
    pub fn get(&mut self, subject: &str, kind: &str) -> Option<Payload> {
        self.get_at(subject, kind, Utc::now())
    }

    pub fn get_at(&mut self, subject: &str, kind: &str, now: DateTime<Utc>) -> Option<Payload> {
        let key = CacheKey::new(subject, kind);
        let fresh = self.entries.get(&key)?.is_fresh(now);
        if fresh {
            return self.entries.get(&key).map(|e| e.payload.clone());
        }
        self.entries.remove(&key);
        tracing::debug!(subject = %subject, kind = %kind, "evicted expired cache entry");
        None
    }

    /// 不触发淘汰的只读查看（含过期条目）
    pub fn peek(&self, subject: &str, kind: &str) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::new(subject, kind))
    }

    /// 当前占用的条目数（包括尚未被读到的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}
