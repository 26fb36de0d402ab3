// flux-gb28181-live: GB28181 直播会话编排
//
// - 前置校验：设备/通道/通道配置/流媒体服务器，固定顺序
// - 开始推流：端口解析 -> 登记等待 -> INVITE -> 等待 on_publish -> 写入会话缓存
// - 停止推流：尽力清理流媒体资源，以 BYE 结果为准

pub mod bridge;
pub mod cache;
pub mod error;
pub mod media;
pub mod model;
pub mod orchestrator;
pub mod play_url;
pub mod precondition;
pub mod registry;
pub mod resource;
pub mod signaling;
pub mod sip;

// 重新导出常用类型
pub use bridge::{ConfirmationBridge, PendingConfirmation};
pub use cache::ActiveSessionCache;
pub use error::{LiveError, Result};
pub use media::{MediaServerApi, RtpPortRecord};
pub use model::{
    ActiveSessionEntry, ChannelConfig, MediaServerInstance, MediaServerPorts,
    OnPublishNotification, PushSocketType, PushStatus, PushTarget, SipChannel, SipDevice,
    StreamInfo,
};
pub use orchestrator::{LiveOptions, LiveSessionOrchestrator};
pub use precondition::{LiveContext, PreconditionValidator};
pub use registry::{
    ChannelConfigStore, DeviceRegistry, InMemoryChannelConfigStore, MediaServerRegistry,
};
pub use resource::{RtpPortPool, RtpResourceManager};
pub use signaling::SipSignaling;
