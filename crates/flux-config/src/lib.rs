pub mod device;
pub mod global;
pub mod live;
pub mod loader;
pub mod media_server;

pub use device::{ChannelSeedConfig, DeviceSeedConfig};
pub use global::{LiveServiceConfig, SystemConfig};
pub use live::{LiveConfig, SipConfig};
pub use loader::{validate, ConfigLoader, CONFIG_FILE_NAME};
pub use media_server::MediaServerConfig;
