// 活跃会话缓存
// 每个 session_key 至多一条，写入即替换

use crate::model::ActiveSessionEntry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 活跃会话缓存
#[derive(Debug, Clone, Default)]
pub struct ActiveSessionCache {
    entries: Arc<RwLock<HashMap<String, ActiveSessionEntry>>>,
}

impl ActiveSessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_key: &str) -> Option<ActiveSessionEntry> {
        self.entries.read().await.get(session_key).cloned()
    }

    /// 写入会话，已存在时替换并返回旧条目
    pub async fn upsert(&self, entry: ActiveSessionEntry) -> Option<ActiveSessionEntry> {
        let key = entry.session_key().to_string();
        self.entries.write().await.insert(key, entry)
    }

    pub async fn remove(&self, session_key: &str) -> Option<ActiveSessionEntry> {
        self.entries.write().await.remove(session_key)
    }

    /// 按 session_key 排序的快照
    pub async fn list(&self) -> Vec<ActiveSessionEntry> {
        let entries = self.entries.read().await;
        let mut items: Vec<ActiveSessionEntry> = entries.values().cloned().collect();
        items.sort_by(|a, b| a.session_key().cmp(b.session_key()));
        items
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
