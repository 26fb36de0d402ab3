use serde::{Deserialize, Serialize};

/// 流媒体服务器配置（ZLMediaKit）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaServerConfig {
    pub media_server_id: String,
    pub ipv4_address: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
    #[serde(default = "default_rtsps_port")]
    pub rtsps_port: u16,
    #[serde(default = "default_rtmp_port")]
    pub rtmp_port: u16,
    #[serde(default = "default_rtmps_port")]
    pub rtmps_port: u16,

    #[serde(default)]
    pub use_ssl: bool,

    /// HTTP API 地址，例如 http://127.0.0.1:80
    pub api_url: String,

    /// API 密钥
    #[serde(default)]
    pub secret: String,

    /// RTP 端口池范围
    #[serde(default = "default_rtp_port_min")]
    pub rtp_port_min: u16,
    #[serde(default = "default_rtp_port_max")]
    pub rtp_port_max: u16,

    /// 固定 RTP 端口，未配置时从服务器读取
    #[serde(default)]
    pub rtp_proxy_port: Option<u16>,
}

fn default_http_port() -> u16 {
    80
}

fn default_https_port() -> u16 {
    443
}

fn default_rtsp_port() -> u16 {
    554
}

fn default_rtsps_port() -> u16 {
    322
}

fn default_rtmp_port() -> u16 {
    1935
}

fn default_rtmps_port() -> u16 {
    19350
}

fn default_rtp_port_min() -> u16 {
    30000
}

fn default_rtp_port_max() -> u16 {
    30500
}
