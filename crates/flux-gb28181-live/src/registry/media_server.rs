use crate::model::MediaServerInstance;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 流媒体服务器注册表
#[derive(Clone, Default)]
pub struct MediaServerRegistry {
    servers: Arc<RwLock<Vec<Arc<MediaServerInstance>>>>,
}

impl MediaServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, server: Arc<MediaServerInstance>) {
        tracing::info!(
            target: "gb28181::live",
            media_server_id = %server.media_server_id,
            ip = %server.ipv4_address,
            "Media server registered"
        );

        self.servers.write().await.push(server);
    }

    /// 查找实例，以最后注册的为准
    pub async fn find(&self, media_server_id: &str) -> Option<Arc<MediaServerInstance>> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .rev()
            .find(|s| s.media_server_id == media_server_id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<Arc<MediaServerInstance>> {
        self.servers.read().await.clone()
    }

    pub async fn unregister(&self, media_server_id: &str) -> usize {
        let mut servers = self.servers.write().await;
        let before = servers.len();
        servers.retain(|s| s.media_server_id != media_server_id);
        before - servers.len()
    }

    pub async fn clear(&self) {
        self.servers.write().await.clear();
    }
}
