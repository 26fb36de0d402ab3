use crate::model::{PushTarget, SipChannel, SipDevice};
use async_trait::async_trait;
use std::time::Duration;

/// 默认 SIP 请求超时
pub const DEFAULT_SIP_TIMEOUT: Duration = Duration::from_millis(5000);

/// SIP 信令代理 trait
///
/// 实现方在 `timeout` 内返回结果，超时视为失败。
#[async_trait]
pub trait SipSignaling: Send + Sync {
    /// 通知设备向推流目标推流（INVITE）
    async fn invite(
        &self,
        device: &SipDevice,
        channel: &SipChannel,
        target: &PushTarget,
        timeout: Duration,
    ) -> anyhow::Result<()>;

    /// 通知设备停止推流（BYE）
    async fn de_invite(
        &self,
        device: &SipDevice,
        channel: &SipChannel,
        timeout: Duration,
    ) -> anyhow::Result<()>;
}
