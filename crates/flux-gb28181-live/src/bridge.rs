// on_publish 回调等待桥
// 同步调用方在此登记等待，流媒体服务器的 on_publish 回调按键唤醒

use crate::error::{LiveError, Result};
use crate::model::OnPublishNotification;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// 等待键前缀
pub const WAIT_ON_PUBLISH_PREFIX: &str = "WAITONPUBLISH_";

/// 由会话键生成等待键
pub fn wait_key(session_key: &str) -> String {
    format!("{}{}", WAIT_ON_PUBLISH_PREFIX, session_key)
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<OnPublishNotification>,
}

type PendingTable = DashMap<String, Vec<Waiter>>;

/// 回调等待桥
#[derive(Clone, Default)]
pub struct ConfirmationBridge {
    pending: Arc<PendingTable>,
    next_id: Arc<AtomicU64>,
}

impl ConfirmationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记等待，必须在触发回调的请求发出之前调用
    pub fn register(&self, session_key: &str) -> PendingConfirmation {
        let key = wait_key(session_key);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.pending
            .entry(key.clone())
            .or_default()
            .push(Waiter { id, tx });

        tracing::debug!(target: "gb28181::hook", wait_key = %key, waiter = id, "Pending confirmation registered");

        PendingConfirmation {
            key,
            id,
            rx: Some(rx),
            pending: self.pending.clone(),
        }
    }

    /// 唤醒该会话键上的所有等待者，返回被唤醒的数量
    pub fn signal(&self, session_key: &str, payload: OnPublishNotification) -> usize {
        let key = wait_key(session_key);
        let Some((_, waiters)) = self.pending.remove(&key) else {
            tracing::debug!(target: "gb28181::hook", wait_key = %key, "No pending confirmation, notification dropped");
            return 0;
        };

        let mut delivered = 0;
        for waiter in waiters {
            if waiter.tx.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::info!(target: "gb28181::hook", wait_key = %key, delivered, "Pending confirmation signaled");

        delivered
    }

    /// 处理 on_publish 回调，流名即会话键
    pub fn on_publish(&self, payload: OnPublishNotification) -> bool {
        let session_key = payload.stream.clone();
        self.signal(&session_key, payload) > 0
    }

    pub fn is_pending(&self, session_key: &str) -> bool {
        self.pending.contains_key(&wait_key(session_key))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// 一次性等待句柄
///
/// 无论超时、被唤醒还是被丢弃，登记项都只移除一次。
pub struct PendingConfirmation {
    key: String,
    id: u64,
    rx: Option<oneshot::Receiver<OnPublishNotification>>,
    pending: Arc<PendingTable>,
}

impl PendingConfirmation {
    pub fn wait_key(&self) -> &str {
        &self.key
    }

    /// 等待回调，超时返回 `ConfirmationTimeout`
    pub async fn wait(mut self, timeout: Duration) -> Result<OnPublishNotification> {
        let Some(mut rx) = self.rx.take() else {
            return Err(LiveError::ConfirmationTimeout(self.key.clone()));
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => {
                self.detach();
                Err(LiveError::ConfirmationTimeout(self.key.clone()))
            }
            Err(_) => {
                self.detach();
                // 摘除前的最后一刻可能已被唤醒
                rx.try_recv()
                    .map_err(|_| LiveError::ConfirmationTimeout(self.key.clone()))
            }
        }
    }

    /// 从等待表中摘除自己
    fn detach(&self) {
        if let Entry::Occupied(mut entry) = self.pending.entry(self.key.clone()) {
            entry.get_mut().retain(|w| w.id != self.id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        self.detach();
    }
}
