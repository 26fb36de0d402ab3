// 根据配置组装注册表与编排器

use crate::zlm::ZlmMediaServerApi;
use flux_config::{DeviceSeedConfig, LiveServiceConfig, MediaServerConfig};
use flux_gb28181_live::{
    ActiveSessionCache, ConfirmationBridge, DeviceRegistry, InMemoryChannelConfigStore,
    LiveOptions, LiveSessionOrchestrator, MediaServerInstance, MediaServerPorts,
    MediaServerRegistry, PreconditionValidator, SipChannel, SipDevice, SipSignaling,
};
use std::sync::Arc;
use std::time::Duration;

/// 一台流媒体服务器及其 API 客户端
pub struct ManagedMediaServer {
    pub instance: Arc<MediaServerInstance>,
    pub api: Arc<ZlmMediaServerApi>,
}

pub fn live_options(config: &LiveServiceConfig) -> LiveOptions {
    LiveOptions {
        sip_timeout: config.live.sip_timeout(),
        confirmation_timeout: config.live.confirmation_timeout(),
        fallback_rtp_port: config.live.fallback_rtp_port,
    }
}

pub fn media_server_ports(config: &MediaServerConfig) -> MediaServerPorts {
    MediaServerPorts {
        http: config.http_port,
        https: config.https_port,
        rtsp: config.rtsp_port,
        rtsps: config.rtsps_port,
        rtmp: config.rtmp_port,
        rtmps: config.rtmps_port,
    }
}

/// 预置设备与通道
pub async fn seed_devices(registry: &DeviceRegistry, seeds: &[DeviceSeedConfig]) {
    for seed in seeds {
        let device = registry
            .register(SipDevice::new(seed.device_id.clone(), seed.ip.clone(), seed.port))
            .await;

        for channel in &seed.channels {
            device
                .add_channel(SipChannel::new(
                    seed.device_id.clone(),
                    channel.channel_id.clone(),
                    channel.stream.clone(),
                    channel.ssrc_id.clone(),
                ))
                .await;
        }
    }
}

/// 注册流媒体服务器
///
/// keeper 视为随服务启动；进程状态由健康检查维护。
pub async fn register_media_servers(
    registry: &MediaServerRegistry,
    configs: &[MediaServerConfig],
) -> anyhow::Result<Vec<ManagedMediaServer>> {
    let mut managed = Vec::with_capacity(configs.len());

    for config in configs {
        let api = Arc::new(ZlmMediaServerApi::new(config)?);
        let instance = Arc::new(MediaServerInstance::new(
            config.media_server_id.clone(),
            config.ipv4_address.clone(),
            media_server_ports(config),
            config.use_ssl,
            api.clone(),
        ));
        instance.set_keeper_running(true);
        instance.set_rtp_proxy_port(config.rtp_proxy_port);

        registry.register(instance.clone()).await;
        managed.push(ManagedMediaServer { instance, api });
    }

    Ok(managed)
}

/// 构建编排器
pub async fn build_orchestrator(
    config: &LiveServiceConfig,
    devices: DeviceRegistry,
    media_servers: MediaServerRegistry,
    sip: Arc<dyn SipSignaling>,
) -> LiveSessionOrchestrator {
    seed_devices(&devices, &config.devices).await;

    let store = Arc::new(InMemoryChannelConfigStore::with_configs(
        config.channels.clone(),
    ));
    let validator = PreconditionValidator::new(devices, media_servers, store);

    LiveSessionOrchestrator::new(
        validator,
        sip,
        ConfirmationBridge::new(),
        ActiveSessionCache::new(),
        live_options(config),
    )
}

/// 单次健康检查
pub async fn check_media_server(server: &ManagedMediaServer, configured_port: Option<u16>) {
    match server.api.server_config().await {
        Ok(remote) => {
            if !server.instance.is_process_running() {
                tracing::info!(
                    target: "gb28181d",
                    media_server_id = %server.instance.media_server_id,
                    "Media server is online"
                );
            }
            server.instance.set_process_running(true);
            server
                .instance
                .set_rtp_proxy_port(configured_port.or(remote.rtp_proxy_port));
        }
        Err(e) => {
            if server.instance.is_process_running() {
                tracing::warn!(
                    target: "gb28181d",
                    media_server_id = %server.instance.media_server_id,
                    error = %e,
                    "Media server is offline"
                );
            }
            server.instance.set_process_running(false);
        }
    }
}

/// 周期性检查流媒体服务器
pub async fn run_health_checks(
    servers: Vec<ManagedMediaServer>,
    configs: Vec<MediaServerConfig>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        for (server, config) in servers.iter().zip(configs.iter()) {
            check_media_server(server, config.rtp_proxy_port).await;
        }
    }
}
