// GB28181 直播会话数据模型
// 设备/通道、流媒体服务器实例、通道配置、流信息

use crate::media::MediaServerApi;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// 未分配流媒体服务器时的占位 ID
pub const UNKNOWN_MEDIA_SERVER: &str = "unknown_server";

/// 推流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PushStatus {
    Off,
    On,
}

impl Default for PushStatus {
    fn default() -> Self {
        Self::Off
    }
}

/// 设备推流的传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PushSocketType {
    Udp,
    Tcp,
}

impl PushSocketType {
    pub fn from_rtp_with_tcp(rtp_with_tcp: bool) -> Self {
        if rtp_with_tcp {
            Self::Tcp
        } else {
            Self::Udp
        }
    }
}

impl fmt::Display for PushSocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushSocketType::Udp => write!(f, "UDP"),
            PushSocketType::Tcp => write!(f, "TCP"),
        }
    }
}

/// 通道推流状态
///
/// `push_status == On` 当且仅当 `stream_info` 有值。
#[derive(Debug, Clone, Default)]
struct PushState {
    push_status: PushStatus,
    stream_info: Option<StreamInfo>,
}

/// GB28181 设备通道（摄像头）
pub struct SipChannel {
    /// 通道 ID（20位国标编码）
    pub channel_id: String,

    /// 所属设备 ID
    pub device_id: String,

    /// 流标识，与 RTP 端口及流媒体服务器上的流名一致
    pub stream: String,

    /// SSRC（十进制字符串）
    pub ssrc_id: String,

    state: RwLock<PushState>,

    /// 通道独占锁，串行化推流状态的修改
    op_lock: Mutex<()>,
}

impl SipChannel {
    pub fn new(device_id: String, channel_id: String, stream: String, ssrc_id: String) -> Self {
        Self {
            channel_id,
            device_id,
            stream,
            ssrc_id,
            state: RwLock::new(PushState::default()),
            op_lock: Mutex::new(()),
        }
    }

    pub async fn push_status(&self) -> PushStatus {
        self.state.read().await.push_status
    }

    pub async fn stream_info(&self) -> Option<StreamInfo> {
        self.state.read().await.stream_info.clone()
    }

    /// 仅当通道处于推流状态且流信息完整时返回
    pub async fn live_stream_info(&self) -> Option<StreamInfo> {
        let state = self.state.read().await;
        match (state.push_status, &state.stream_info) {
            (PushStatus::On, Some(info)) => Some(info.clone()),
            _ => None,
        }
    }

    /// 获取通道独占锁
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    /// 恢复带外推流状态（例如进程重启后从流媒体服务器同步）
    pub async fn restore_live(&self, info: StreamInfo) {
        let _guard = self.lock().await;
        self.mark_live(info).await;
    }

    /// 调用方必须持有通道锁
    pub(crate) async fn mark_live(&self, info: StreamInfo) {
        let mut state = self.state.write().await;
        state.push_status = PushStatus::On;
        state.stream_info = Some(info);
    }

    /// 调用方必须持有通道锁
    pub(crate) async fn mark_idle(&self) {
        let mut state = self.state.write().await;
        state.push_status = PushStatus::Off;
        state.stream_info = None;
    }

    pub async fn snapshot(&self) -> ChannelSnapshot {
        let state = self.state.read().await;
        ChannelSnapshot {
            device_id: self.device_id.clone(),
            channel_id: self.channel_id.clone(),
            stream: self.stream.clone(),
            ssrc_id: self.ssrc_id.clone(),
            push_status: state.push_status,
            stream_info: state.stream_info.clone(),
        }
    }
}

impl fmt::Debug for SipChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipChannel")
            .field("device_id", &self.device_id)
            .field("channel_id", &self.channel_id)
            .field("stream", &self.stream)
            .field("ssrc_id", &self.ssrc_id)
            .finish_non_exhaustive()
    }
}

/// GB28181 设备
pub struct SipDevice {
    /// 设备 ID（20位国标编码）
    pub device_id: String,

    /// 设备 IP 地址
    pub ip: String,

    /// 设备 SIP 端口
    pub port: u16,

    /// 注册时间
    pub registered_at: DateTime<Utc>,

    /// 通道列表（按加入顺序）
    channels: RwLock<Vec<Arc<SipChannel>>>,
}

impl SipDevice {
    pub fn new(device_id: String, ip: String, port: u16) -> Self {
        Self {
            device_id,
            ip,
            port,
            registered_at: Utc::now(),
            channels: RwLock::new(Vec::new()),
        }
    }

    /// 添加通道（追加，同 ID 的旧通道保留在列表中）
    pub async fn add_channel(&self, channel: SipChannel) -> Arc<SipChannel> {
        let channel = Arc::new(channel);
        self.channels.write().await.push(channel.clone());
        channel
    }

    /// 查找通道，多个同 ID 通道时以最后加入的为准
    pub async fn find_channel(&self, channel_id: &str) -> Option<Arc<SipChannel>> {
        let channels = self.channels.read().await;
        channels
            .iter()
            .rev()
            .find(|c| c.channel_id == channel_id)
            .cloned()
    }

    pub async fn channels(&self) -> Vec<Arc<SipChannel>> {
        self.channels.read().await.clone()
    }

    pub async fn snapshot(&self) -> DeviceSnapshot {
        let channels = self.channels().await;
        let mut items = Vec::with_capacity(channels.len());
        for channel in channels {
            items.push(channel.snapshot().await);
        }

        DeviceSnapshot {
            device_id: self.device_id.clone(),
            ip: self.ip.clone(),
            port: self.port,
            registered_at: self.registered_at,
            channels: items,
        }
    }
}

impl fmt::Debug for SipDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipDevice")
            .field("device_id", &self.device_id)
            .field("ip", &self.ip)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// 设备快照（对外查询使用）
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub ip: String,
    pub port: u16,
    pub registered_at: DateTime<Utc>,
    pub channels: Vec<ChannelSnapshot>,
}

/// 通道快照（对外查询使用）
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub device_id: String,
    pub channel_id: String,
    pub stream: String,
    pub ssrc_id: String,
    pub push_status: PushStatus,
    pub stream_info: Option<StreamInfo>,
}

/// 流媒体服务器各协议端口
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaServerPorts {
    pub http: u16,
    pub https: u16,
    pub rtsp: u16,
    pub rtsps: u16,
    pub rtmp: u16,
    pub rtmps: u16,
}

/// 流媒体服务器实例
pub struct MediaServerInstance {
    pub media_server_id: String,
    pub ipv4_address: String,
    pub ports: MediaServerPorts,

    /// 是否启用 TLS 播放地址
    pub use_ssl: bool,

    keeper_running: AtomicBool,
    process_running: AtomicBool,

    /// 固定 RTP 端口（rtp_proxy.port），0 表示未知
    rtp_proxy_port: AtomicU16,

    /// 流媒体控制接口
    api: Arc<dyn MediaServerApi>,
}

impl MediaServerInstance {
    pub fn new(
        media_server_id: String,
        ipv4_address: String,
        ports: MediaServerPorts,
        use_ssl: bool,
        api: Arc<dyn MediaServerApi>,
    ) -> Self {
        Self {
            media_server_id,
            ipv4_address,
            ports,
            use_ssl,
            keeper_running: AtomicBool::new(false),
            process_running: AtomicBool::new(false),
            rtp_proxy_port: AtomicU16::new(0),
            api,
        }
    }

    pub fn api(&self) -> &Arc<dyn MediaServerApi> {
        &self.api
    }

    pub fn is_keeper_running(&self) -> bool {
        self.keeper_running.load(Ordering::Acquire)
    }

    pub fn is_process_running(&self) -> bool {
        self.process_running.load(Ordering::Acquire)
    }

    pub fn set_keeper_running(&self, running: bool) {
        self.keeper_running.store(running, Ordering::Release);
    }

    pub fn set_process_running(&self, running: bool) {
        self.process_running.store(running, Ordering::Release);
    }

    pub fn rtp_proxy_port(&self) -> Option<u16> {
        match self.rtp_proxy_port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    pub fn set_rtp_proxy_port(&self, port: Option<u16>) {
        self.rtp_proxy_port
            .store(port.unwrap_or(0), Ordering::Release);
    }
}

impl fmt::Debug for MediaServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaServerInstance")
            .field("media_server_id", &self.media_server_id)
            .field("ipv4_address", &self.ipv4_address)
            .field("ports", &self.ports)
            .field("use_ssl", &self.use_ssl)
            .field("keeper_running", &self.is_keeper_running())
            .field("process_running", &self.is_process_running())
            .field("rtp_proxy_port", &self.rtp_proxy_port())
            .finish_non_exhaustive()
    }
}

/// 通道持久化配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 通道主键，活跃会话缓存与回调等待表都以此为键
    pub session_key: String,
    pub device_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default = "default_app")]
    pub app: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    pub enabled: bool,
    pub media_server_id: String,

    /// 使用流媒体服务器固定 RTP 端口
    #[serde(default)]
    pub default_rtp_port: bool,

    /// 设备使用 TCP 推流
    #[serde(default)]
    pub rtp_with_tcp: bool,

    #[serde(default)]
    pub auto_video: bool,
    #[serde(default)]
    pub auto_record: bool,
    #[serde(default)]
    pub no_player_break: bool,
    #[serde(default)]
    pub has_ptz: bool,
    #[serde(default)]
    pub ipv4_address: Option<String>,
}

fn default_app() -> String {
    "rtp".to_string()
}

fn default_vhost() -> String {
    "__defaultVhost__".to_string()
}

impl ChannelConfig {
    /// 通道已启用且分配了流媒体服务器
    pub fn is_activated(&self) -> bool {
        self.enabled && !self.media_server_id.contains(UNKNOWN_MEDIA_SERVER)
    }

    pub fn push_socket_type(&self) -> PushSocketType {
        PushSocketType::from_rtp_with_tcp(self.rtp_with_tcp)
    }
}

/// 播放者信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPlayer {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub params: Option<String>,
}

/// 已确认的直播流信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub app: String,
    pub stream: String,
    pub vhost: String,
    pub ssrc: u32,

    /// 分配给本次会话的 RTP 端口
    pub rtp_port: u16,

    /// 流媒体服务器上报的推流端口
    pub stream_port: u16,

    /// 流媒体服务器上报的推流 IP
    pub stream_ip: String,

    pub media_server_id: String,
    pub media_server_ip: String,
    pub push_socket_type: PushSocketType,

    /// TCP 推流时的连接 ID
    pub stream_tcp_id: Option<String>,
    pub params: Option<String>,
    pub start_time: DateTime<Utc>,
    pub play_urls: Vec<String>,
    pub players: Vec<StreamPlayer>,
}

/// 活跃会话缓存条目（通道配置 + 流信息）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionEntry {
    #[serde(flatten)]
    pub config: ChannelConfig,
    pub stream_info: StreamInfo,
}

impl ActiveSessionEntry {
    pub fn new(config: ChannelConfig, stream_info: StreamInfo) -> Self {
        Self {
            config,
            stream_info,
        }
    }

    pub fn session_key(&self) -> &str {
        &self.config.session_key
    }
}

/// 下发给设备的推流目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub stream_port: u16,
    pub media_server_ip: String,
    pub socket_type: PushSocketType,
    pub ssrc: u32,
}

/// 流媒体服务器 on_publish 回调内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnPublishNotification {
    pub app: String,
    pub stream: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(rename = "mediaServerId", default)]
    pub media_server_id: String,
}
