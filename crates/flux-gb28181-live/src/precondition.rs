// 推流前置校验
// 按固定顺序校验，第一个失败即返回，保证错误码可复现

use crate::error::{LiveError, Result};
use crate::model::{ChannelConfig, MediaServerInstance, SipChannel, SipDevice};
use crate::registry::{ChannelConfigStore, DeviceRegistry, MediaServerRegistry};
use std::sync::Arc;

/// 校验通过后解析出的会话上下文
#[derive(Debug, Clone)]
pub struct LiveContext {
    pub device: Arc<SipDevice>,
    pub channel: Arc<SipChannel>,
    pub config: ChannelConfig,
    pub media_server: Arc<MediaServerInstance>,
}

impl LiveContext {
    pub fn session_key(&self) -> &str {
        &self.config.session_key
    }
}

/// 前置校验器，无副作用
#[derive(Clone)]
pub struct PreconditionValidator {
    devices: DeviceRegistry,
    media_servers: MediaServerRegistry,
    channel_configs: Arc<dyn ChannelConfigStore>,
}

impl PreconditionValidator {
    pub fn new(
        devices: DeviceRegistry,
        media_servers: MediaServerRegistry,
        channel_configs: Arc<dyn ChannelConfigStore>,
    ) -> Self {
        Self {
            devices,
            media_servers,
            channel_configs,
        }
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn media_servers(&self) -> &MediaServerRegistry {
        &self.media_servers
    }

    /// 定位设备与通道（校验 1-3）
    pub async fn locate(
        &self,
        device_id: &str,
        channel_id: &str,
    ) -> Result<(Arc<SipDevice>, Arc<SipChannel>)> {
        require_ids(device_id, channel_id)?;

        let device = self
            .devices
            .find(device_id)
            .await
            .ok_or_else(|| LiveError::DeviceNotFound(device_id.to_string()))?;

        let channel = device
            .find_channel(channel_id)
            .await
            .ok_or_else(|| LiveError::ChannelNotFound(format!("{}-{}", device_id, channel_id)))?;

        Ok((device, channel))
    }

    /// 完整校验（校验 1-8）
    pub async fn check(&self, device_id: &str, channel_id: &str) -> Result<LiveContext> {
        let (device, channel) = self.locate(device_id, channel_id).await?;
        let key = format!("{}-{}", device_id, channel_id);

        let config = self
            .channel_configs
            .find(device_id, channel_id)
            .await
            .ok_or_else(|| LiveError::ChannelConfigNotFound(key.clone()))?;

        if !config.is_activated() {
            return Err(LiveError::ChannelNotActivated(key));
        }

        let media_server = self
            .media_servers
            .find(&config.media_server_id)
            .await
            .ok_or_else(|| LiveError::MediaServerInstanceMissing(config.media_server_id.clone()))?;

        if !media_server.is_keeper_running() {
            return Err(LiveError::SupervisorNotRunning(
                media_server.media_server_id.clone(),
            ));
        }

        if !media_server.is_process_running() {
            return Err(LiveError::MediaServerNotRunning(
                media_server.media_server_id.clone(),
            ));
        }

        Ok(LiveContext {
            device,
            channel,
            config,
            media_server,
        })
    }
}

/// 设备 ID 与通道 ID 均不能为空
pub fn require_ids(device_id: &str, channel_id: &str) -> Result<()> {
    if device_id.is_empty() || channel_id.is_empty() {
        return Err(LiveError::invalid_params(format!(
            "device_id={:?} channel_id={:?}",
            device_id, channel_id
        )));
    }
    Ok(())
}
