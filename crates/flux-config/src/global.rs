use flux_gb28181_live::ChannelConfig;
use serde::{Deserialize, Serialize};

use crate::device::DeviceSeedConfig;
use crate::live::{LiveConfig, SipConfig};
use crate::media_server::MediaServerConfig;

/// GB28181 直播服务配置（gb28181d.toml）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveServiceConfig {
    pub system: SystemConfig,
    pub live: LiveConfig,
    pub sip: SipConfig,
    pub media_servers: Vec<MediaServerConfig>,

    /// 设备注册表初始内容
    pub devices: Vec<DeviceSeedConfig>,

    /// 通道配置存储内容
    pub channels: Vec<ChannelConfig>,
}

/// 系统配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemConfig {
    pub name: String,
    pub version: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "FLUX IOT GB28181 Live".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

impl Default for LiveServiceConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            live: LiveConfig::default(),
            sip: SipConfig::default(),
            media_servers: Vec::new(),
            devices: Vec::new(),
            channels: Vec::new(),
        }
    }
}

impl LiveServiceConfig {
    /// 导出为 TOML
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
