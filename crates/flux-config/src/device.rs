use serde::{Deserialize, Serialize};

/// 启动时预置的设备
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceSeedConfig {
    pub device_id: String,
    pub ip: String,
    #[serde(default = "default_sip_port")]
    pub port: u16,
    #[serde(default)]
    pub channels: Vec<ChannelSeedConfig>,
}

/// 预置设备下的通道
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelSeedConfig {
    pub channel_id: String,

    /// 流标识，与通道配置的 session_key 一致
    pub stream: String,

    /// SSRC（十进制字符串）
    pub ssrc_id: String,
}

fn default_sip_port() -> u16 {
    5060
}
