use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 直播会话编排配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveConfig {
    /// INVITE/BYE 超时（毫秒）
    pub sip_timeout_ms: u64,

    /// 等待 on_publish 回调的超时（毫秒）
    pub confirmation_timeout_ms: u64,

    /// 固定端口模式下的兜底端口
    pub fallback_rtp_port: u16,

    /// 流媒体健康检查间隔（秒）
    pub health_check_interval_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sip_timeout_ms: 5000,
            confirmation_timeout_ms: 5000,
            fallback_rtp_port: 10000,
            health_check_interval_secs: 10,
        }
    }
}

impl LiveConfig {
    pub fn sip_timeout(&self) -> Duration {
        Duration::from_millis(self.sip_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

/// SIP 信令配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SipConfig {
    /// 监听地址
    pub bind_addr: String,

    /// 平台 SIP ID
    pub sip_id: String,

    /// SIP 域
    pub sip_domain: String,

    /// Via/Contact 中使用的本机地址
    pub local_ip: String,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5060".to_string(),
            sip_id: "34020000002000000001".to_string(),
            sip_domain: "3402000000".to_string(),
            local_ip: "127.0.0.1".to_string(),
        }
    }
}
