#![allow(dead_code)]

use async_trait::async_trait;
use flux_gb28181_live::{
    ActiveSessionCache, ChannelConfig, ConfirmationBridge, DeviceRegistry,
    InMemoryChannelConfigStore, LiveOptions, LiveSessionOrchestrator, MediaServerApi,
    MediaServerInstance, MediaServerPorts, MediaServerRegistry, OnPublishNotification,
    PreconditionValidator, PushTarget, RtpPortRecord, SipChannel, SipDevice, SipSignaling,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEVICE_ID: &str = "34020000001320000001";
pub const CHANNEL_ID: &str = "34020000001310000001";
pub const SESSION_KEY: &str = "1a2b3c4d";
pub const SSRC_ID: &str = "0100000001";
pub const MEDIA_SERVER_ID: &str = "zlm-1";
pub const ALLOCATED_PORT: u16 = 30000;

/// 计数用的 SIP 信令替身
///
/// 开启自动确认时，INVITE 成功后立即模拟流媒体的 on_publish 回调。
#[derive(Default)]
pub struct FakeSip {
    pub invites: AtomicUsize,
    pub byes: AtomicUsize,
    pub fail_invite: AtomicBool,
    pub fail_bye: AtomicBool,
    pub last_target: Mutex<Option<PushTarget>>,
    auto_confirm: Mutex<Option<ConfirmationBridge>>,
    bye_delay: Mutex<Option<Duration>>,
}

impl FakeSip {
    pub fn confirm_with(&self, bridge: ConfirmationBridge) {
        *self.auto_confirm.lock().unwrap() = Some(bridge);
    }

    pub fn stop_confirming(&self) {
        *self.auto_confirm.lock().unwrap() = None;
    }

    pub fn delay_bye(&self, delay: Duration) {
        *self.bye_delay.lock().unwrap() = Some(delay);
    }

    pub fn invite_count(&self) -> usize {
        self.invites.load(Ordering::SeqCst)
    }

    pub fn bye_count(&self) -> usize {
        self.byes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SipSignaling for FakeSip {
    async fn invite(
        &self,
        _device: &SipDevice,
        channel: &SipChannel,
        target: &PushTarget,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        self.invites.fetch_add(1, Ordering::SeqCst);
        *self.last_target.lock().unwrap() = Some(target.clone());

        if self.fail_invite.load(Ordering::SeqCst) {
            anyhow::bail!("486 Busy Here");
        }

        let bridge = self.auto_confirm.lock().unwrap().clone();
        if let Some(bridge) = bridge {
            bridge.on_publish(on_publish(&channel.stream));
        }

        Ok(())
    }

    async fn de_invite(
        &self,
        _device: &SipDevice,
        _channel: &SipChannel,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        self.byes.fetch_add(1, Ordering::SeqCst);

        let delay = *self.bye_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_bye.load(Ordering::SeqCst) {
            anyhow::bail!("BYE timeout");
        }
        Ok(())
    }
}

/// 计数用的流媒体控制接口替身
#[derive(Default)]
pub struct FakeMediaApi {
    pub opens: AtomicUsize,
    pub close_ports: AtomicUsize,
    pub close_streams: AtomicUsize,
    pub releases: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_teardown: AtomicBool,
    /// 覆盖返回的端口记录流名
    pub stream_override: Mutex<Option<String>>,
    pub released_ports: Mutex<Vec<u16>>,
}

impl FakeMediaApi {
    pub fn total_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
            + self.close_ports.load(Ordering::SeqCst)
            + self.close_streams.load(Ordering::SeqCst)
            + self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaServerApi for FakeMediaApi {
    async fn open_rtp_port(
        &self,
        _media_server_id: &str,
        session_key: &str,
    ) -> anyhow::Result<RtpPortRecord> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.fail_open.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection refused").context("openRtpServer"));
        }

        let stream = self
            .stream_override
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| session_key.to_string());

        Ok(RtpPortRecord {
            port: ALLOCATED_PORT,
            stream,
        })
    }

    async fn close_rtp_port(&self, _stream_id: &str) -> anyhow::Result<()> {
        self.close_ports.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown.load(Ordering::SeqCst) {
            anyhow::bail!("closeRtpServer failed");
        }
        Ok(())
    }

    async fn close_streams(
        &self,
        _app: &str,
        _stream: &str,
        _vhost: &str,
        _force: bool,
    ) -> anyhow::Result<()> {
        self.close_streams.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown.load(Ordering::SeqCst) {
            anyhow::bail!("close_streams failed");
        }
        Ok(())
    }

    async fn release_rtp_port(&self, port: u16) -> anyhow::Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.released_ports.lock().unwrap().push(port);
        Ok(())
    }
}

pub fn on_publish(stream: &str) -> OnPublishNotification {
    OnPublishNotification {
        app: "rtp".to_string(),
        stream: stream.to_string(),
        vhost: "__defaultVhost__".to_string(),
        ip: "10.0.0.9".to_string(),
        port: 40000,
        id: "140".to_string(),
        params: Some("".to_string()),
        media_server_id: MEDIA_SERVER_ID.to_string(),
    }
}

pub fn channel_config() -> ChannelConfig {
    ChannelConfig {
        session_key: SESSION_KEY.to_string(),
        device_id: DEVICE_ID.to_string(),
        channel_id: CHANNEL_ID.to_string(),
        channel_name: "gate".to_string(),
        app: "rtp".to_string(),
        vhost: "__defaultVhost__".to_string(),
        enabled: true,
        media_server_id: MEDIA_SERVER_ID.to_string(),
        default_rtp_port: false,
        rtp_with_tcp: false,
        auto_video: false,
        auto_record: false,
        no_player_break: false,
        has_ptz: false,
        ipv4_address: None,
    }
}

pub fn media_server(api: Arc<FakeMediaApi>, running: bool) -> Arc<MediaServerInstance> {
    let server = MediaServerInstance::new(
        MEDIA_SERVER_ID.to_string(),
        "10.0.0.1".to_string(),
        MediaServerPorts {
            http: 80,
            https: 443,
            rtsp: 554,
            rtsps: 322,
            rtmp: 1935,
            rtmps: 19350,
        },
        false,
        api,
    );
    server.set_keeper_running(running);
    server.set_process_running(running);
    Arc::new(server)
}

pub async fn device_with_channel(devices: &DeviceRegistry) -> Arc<SipChannel> {
    let device = devices
        .register(SipDevice::new(
            DEVICE_ID.to_string(),
            "192.168.1.100".to_string(),
            5060,
        ))
        .await;

    device
        .add_channel(SipChannel::new(
            DEVICE_ID.to_string(),
            CHANNEL_ID.to_string(),
            SESSION_KEY.to_string(),
            SSRC_ID.to_string(),
        ))
        .await
}

/// 组装好的编排器及其替身
pub struct Harness {
    pub orchestrator: Arc<LiveSessionOrchestrator>,
    pub sip: Arc<FakeSip>,
    pub media: Arc<FakeMediaApi>,
    pub devices: DeviceRegistry,
    pub media_servers: MediaServerRegistry,
    pub configs: InMemoryChannelConfigStore,
    pub bridge: ConfirmationBridge,
    pub cache: ActiveSessionCache,
}

impl Harness {
    /// 空注册表，用于逐步构造前置校验失败场景
    pub fn empty() -> Self {
        let sip = Arc::new(FakeSip::default());
        let media = Arc::new(FakeMediaApi::default());
        let devices = DeviceRegistry::new();
        let media_servers = MediaServerRegistry::new();
        let configs = InMemoryChannelConfigStore::new();
        let bridge = ConfirmationBridge::new();
        let cache = ActiveSessionCache::new();

        let validator = PreconditionValidator::new(
            devices.clone(),
            media_servers.clone(),
            Arc::new(configs.clone()),
        );

        let options = LiveOptions {
            sip_timeout: Duration::from_millis(500),
            confirmation_timeout: Duration::from_millis(200),
            ..Default::default()
        };

        let orchestrator = Arc::new(LiveSessionOrchestrator::new(
            validator,
            sip.clone(),
            bridge.clone(),
            cache.clone(),
            options,
        ));

        Self {
            orchestrator,
            sip,
            media,
            devices,
            media_servers,
            configs,
            bridge,
            cache,
        }
    }

    /// 一个设备一个通道，流媒体运行中，INVITE 后自动确认
    pub async fn ready() -> Self {
        Self::ready_with(channel_config()).await
    }

    pub async fn ready_with(config: ChannelConfig) -> Self {
        let harness = Self::empty();
        device_with_channel(&harness.devices).await;
        harness.configs.upsert(config).await;
        harness
            .media_servers
            .register(media_server(harness.media.clone(), true))
            .await;
        harness.sip.confirm_with(harness.bridge.clone());
        harness
    }

    pub async fn channel(&self) -> Arc<SipChannel> {
        self.orchestrator
            .get_channel(DEVICE_ID, CHANNEL_ID)
            .await
            .unwrap()
    }
}
