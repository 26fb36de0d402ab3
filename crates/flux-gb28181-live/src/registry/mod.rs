// 外部注册表：设备/通道、流媒体服务器、通道配置
//
// 设备与流媒体服务器注册表按注册顺序保存，查找时以最后注册的条目为准，
// 重复注册（设备重新上线）通过追加实现。

pub mod channel_config;
pub mod device;
pub mod media_server;

pub use channel_config::{ChannelConfigStore, InMemoryChannelConfigStore};
pub use device::DeviceRegistry;
pub use media_server::MediaServerRegistry;
