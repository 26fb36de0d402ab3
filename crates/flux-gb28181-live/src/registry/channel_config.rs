use crate::model::ChannelConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 通道配置存储 trait（持久化实现由外部提供）
#[async_trait]
pub trait ChannelConfigStore: Send + Sync {
    async fn find(&self, device_id: &str, channel_id: &str) -> Option<ChannelConfig>;
}

/// 内存通道配置存储，按 (device_id, channel_id) 唯一
#[derive(Clone, Default)]
pub struct InMemoryChannelConfigStore {
    configs: Arc<RwLock<Vec<ChannelConfig>>>,
}

impl InMemoryChannelConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs(configs: Vec<ChannelConfig>) -> Self {
        let mut deduped: Vec<ChannelConfig> = Vec::with_capacity(configs.len());
        for config in configs {
            deduped.retain(|c| !(c.device_id == config.device_id && c.channel_id == config.channel_id));
            deduped.push(config);
        }

        Self {
            configs: Arc::new(RwLock::new(deduped)),
        }
    }

    /// 写入配置，已存在时替换
    pub async fn upsert(&self, config: ChannelConfig) {
        let mut configs = self.configs.write().await;
        configs.retain(|c| !(c.device_id == config.device_id && c.channel_id == config.channel_id));
        configs.push(config);
    }

    pub async fn remove(&self, device_id: &str, channel_id: &str) -> Option<ChannelConfig> {
        let mut configs = self.configs.write().await;
        let pos = configs
            .iter()
            .position(|c| c.device_id == device_id && c.channel_id == channel_id)?;
        Some(configs.remove(pos))
    }

    pub async fn list(&self) -> Vec<ChannelConfig> {
        self.configs.read().await.clone()
    }
}

#[async_trait]
impl ChannelConfigStore for InMemoryChannelConfigStore {
    async fn find(&self, device_id: &str, channel_id: &str) -> Option<ChannelConfig> {
        let configs = self.configs.read().await;
        configs
            .iter()
            .find(|c| c.device_id == device_id && c.channel_id == channel_id)
            .cloned()
    }
}
