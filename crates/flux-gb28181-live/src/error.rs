use thiserror::Error;

/// 直播会话错误类型
///
/// 前置校验的失败原样返回给调用方；外部协作方（SIP/流媒体）的错误
/// 在边界处被包装为对应的种类，诊断信息保留在消息里。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// 参数不正确（设备 ID 或通道 ID 为空）
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Sip device not found: {0}")]
    DeviceNotFound(String),

    #[error("Sip channel not found: {0}")]
    ChannelNotFound(String),

    /// 数据库中没有通道配置
    #[error("Channel config not found: {0}")]
    ChannelConfigNotFound(String),

    /// 通道未启用或未分配流媒体服务器
    #[error("Channel not activated: {0}")]
    ChannelNotActivated(String),

    #[error("Media server instance missing: {0}")]
    MediaServerInstanceMissing(String),

    /// 流媒体守护进程（keeper）未运行
    #[error("Media server supervisor not running: {0}")]
    SupervisorNotRunning(String),

    #[error("Media server not running: {0}")]
    MediaServerNotRunning(String),

    #[error("Rtp port allocation failed: {0}")]
    RtpPortAllocationFailed(String),

    /// 端口记录与通道流标识不一致等协议层异常
    #[error("Protocol inconsistency: {0}")]
    ProtocolInconsistency(String),

    #[error("Sip signaling failed: {0}")]
    SipSignalingFailed(String),

    /// 等待 on_publish 回调超时
    #[error("Wait for on_publish confirmation timeout: {0}")]
    ConfirmationTimeout(String),

    #[error("Stream not active: {0}")]
    StreamNotActive(String),
}

/// 直播会话结果类型
pub type Result<T> = std::result::Result<T, LiveError>;

impl LiveError {
    /// 稳定的错误码，对外接口使用
    pub fn code(&self) -> u32 {
        match self {
            LiveError::InvalidParams(_) => 10001,
            LiveError::ChannelConfigNotFound(_) => 10002,
            LiveError::ChannelNotActivated(_) => 10003,
            LiveError::DeviceNotFound(_) => 20001,
            LiveError::ChannelNotFound(_) => 20002,
            LiveError::ProtocolInconsistency(_) => 20003,
            LiveError::SipSignalingFailed(_) => 20004,
            LiveError::StreamNotActive(_) => 20005,
            LiveError::MediaServerInstanceMissing(_) => 30001,
            LiveError::SupervisorNotRunning(_) => 30002,
            LiveError::MediaServerNotRunning(_) => 30003,
            LiveError::RtpPortAllocationFailed(_) => 30004,
            LiveError::ConfirmationTimeout(_) => 30005,
        }
    }

    /// 错误种类名称
    pub fn kind(&self) -> &'static str {
        match self {
            LiveError::InvalidParams(_) => "InvalidParams",
            LiveError::DeviceNotFound(_) => "DeviceNotFound",
            LiveError::ChannelNotFound(_) => "ChannelNotFound",
            LiveError::ChannelConfigNotFound(_) => "ChannelConfigNotFound",
            LiveError::ChannelNotActivated(_) => "ChannelNotActivated",
            LiveError::MediaServerInstanceMissing(_) => "MediaServerInstanceMissing",
            LiveError::SupervisorNotRunning(_) => "SupervisorNotRunning",
            LiveError::MediaServerNotRunning(_) => "MediaServerNotRunning",
            LiveError::RtpPortAllocationFailed(_) => "RtpPortAllocationFailed",
            LiveError::ProtocolInconsistency(_) => "ProtocolInconsistency",
            LiveError::SipSignalingFailed(_) => "SipSignalingFailed",
            LiveError::ConfirmationTimeout(_) => "ConfirmationTimeout",
            LiveError::StreamNotActive(_) => "StreamNotActive",
        }
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        LiveError::InvalidParams(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        LiveError::ProtocolInconsistency(msg.into())
    }

    /// 包装端口分配异常，保留原始错误链
    pub fn rtp_allocation(err: &anyhow::Error) -> Self {
        LiveError::RtpPortAllocationFailed(format!("{:#}", err))
    }

    pub fn signaling(err: impl std::fmt::Display) -> Self {
        LiveError::SipSignalingFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_unique() {
        let errors = vec![
            LiveError::InvalidParams(String::new()),
            LiveError::DeviceNotFound(String::new()),
            LiveError::ChannelNotFound(String::new()),
            LiveError::ChannelConfigNotFound(String::new()),
            LiveError::ChannelNotActivated(String::new()),
            LiveError::MediaServerInstanceMissing(String::new()),
            LiveError::SupervisorNotRunning(String::new()),
            LiveError::MediaServerNotRunning(String::new()),
            LiveError::RtpPortAllocationFailed(String::new()),
            LiveError::ProtocolInconsistency(String::new()),
            LiveError::SipSignalingFailed(String::new()),
            LiveError::ConfirmationTimeout(String::new()),
            LiveError::StreamNotActive(String::new()),
        ];

        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_rtp_allocation_keeps_context() {
        let err = anyhow::anyhow!("connection refused").context("openRtpServer");
        let live = LiveError::rtp_allocation(&err);

        assert_eq!(live.kind(), "RtpPortAllocationFailed");
        assert!(live.to_string().contains("openRtpServer"));
        assert!(live.to_string().contains("connection refused"));
    }
}
