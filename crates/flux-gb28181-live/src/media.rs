// 流媒体服务器控制接口
// 申请/关闭 RTP 端口、关闭流、归还端口

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// RTP 端口申请结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpPortRecord {
    pub port: u16,

    /// 端口绑定的流标识
    pub stream: String,
}

/// 流媒体服务器控制接口 trait
#[async_trait]
pub trait MediaServerApi: Send + Sync {
    /// 为会话申请 RTP 收流端口
    async fn open_rtp_port(
        &self,
        media_server_id: &str,
        session_key: &str,
    ) -> anyhow::Result<RtpPortRecord>;

    /// 关闭 RTP 收流端口
    async fn close_rtp_port(&self, stream_id: &str) -> anyhow::Result<()>;

    /// 关闭流
    async fn close_streams(
        &self,
        app: &str,
        stream: &str,
        vhost: &str,
        force: bool,
    ) -> anyhow::Result<()>;

    /// 归还端口到端口池
    async fn release_rtp_port(&self, port: u16) -> anyhow::Result<()>;
}
