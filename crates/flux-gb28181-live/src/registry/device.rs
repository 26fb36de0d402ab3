use crate::model::SipDevice;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 设备注册表
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<Vec<Arc<SipDevice>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册设备（追加）
    pub async fn register(&self, device: SipDevice) -> Arc<SipDevice> {
        let device = Arc::new(device);
        self.devices.write().await.push(device.clone());

        tracing::info!(
            target: "gb28181::live",
            device_id = %device.device_id,
            ip = %device.ip,
            port = device.port,
            "Sip device registered"
        );

        device
    }

    /// 查找设备，以最后注册的为准
    pub async fn find(&self, device_id: &str) -> Option<Arc<SipDevice>> {
        let devices = self.devices.read().await;
        devices
            .iter()
            .rev()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    /// 按注册顺序列出设备
    pub async fn list(&self) -> Vec<Arc<SipDevice>> {
        self.devices.read().await.clone()
    }

    /// 注销设备，返回移除的条目数
    pub async fn unregister(&self, device_id: &str) -> usize {
        let mut devices = self.devices.write().await;
        let before = devices.len();
        devices.retain(|d| d.device_id != device_id);
        let removed = before - devices.len();

        if removed > 0 {
            tracing::info!(target: "gb28181::live", %device_id, removed, "Sip device unregistered");
        }

        removed
    }

    pub async fn count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn clear(&self) {
        self.devices.write().await.clear();
    }
}
