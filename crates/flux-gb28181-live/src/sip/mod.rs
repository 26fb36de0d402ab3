// GB28181 SIP 信令
// INVITE/BYE 推流控制的 UDP 实现

pub mod message;
pub mod proxy;
pub mod sdp;

pub use message::{SipMessage, SipMethod, SipRequest, SipResponse};
pub use proxy::{SipProxyConfig, UdpSipProxy};
pub use sdp::PlaySdp;

use thiserror::Error;

/// SIP 信令错误
#[derive(Error, Debug)]
pub enum SipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    /// 超时未收到最终响应
    #[error("{method} timeout, call_id={call_id}")]
    Timeout { method: SipMethod, call_id: String },

    /// 设备返回非 2xx 最终响应
    #[error("{method} rejected: {status} {reason}")]
    Rejected {
        method: SipMethod,
        status: u16,
        reason: String,
    },

    #[error("Transaction closed: {0}")]
    Closed(String),
}
