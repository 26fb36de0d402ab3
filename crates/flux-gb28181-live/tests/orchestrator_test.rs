mod common;

use common::*;
use flux_gb28181_live::model::UNKNOWN_MEDIA_SERVER;
use flux_gb28181_live::{LiveError, PushSocketType, PushStatus, SipChannel, SipDevice};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_empty_ids_are_rejected_without_side_effects() {
    let h = Harness::ready().await;

    let cases = [("", CHANNEL_ID), (DEVICE_ID, ""), ("", "")];
    for (device_id, channel_id) in cases {
        let err = h.orchestrator.start(device_id, channel_id, None).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");

        let err = h.orchestrator.stop(device_id, channel_id).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");

        let err = h.orchestrator.get_stream_info(device_id, channel_id).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");

        let err = h.orchestrator.is_live(device_id, channel_id).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
    }

    assert_eq!(h.sip.invite_count(), 0);
    assert_eq!(h.sip.bye_count(), 0);
    assert_eq!(h.media.total_calls(), 0);
    assert!(h.cache.is_empty().await);
    assert_eq!(h.bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_precondition_order_is_deterministic() {
    // 每一步都同时让后续步骤失败，只应报告当前步骤
    let h = Harness::empty();
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::DeviceNotFound(_)));

    h.devices
        .register(SipDevice::new(DEVICE_ID.to_string(), "192.168.1.100".to_string(), 5060))
        .await;
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::ChannelNotFound(_)));

    device_with_channel(&h.devices).await;
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::ChannelConfigNotFound(_)));

    let mut config = channel_config();
    config.enabled = false;
    config.media_server_id = UNKNOWN_MEDIA_SERVER.to_string();
    h.configs.upsert(config.clone()).await;
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::ChannelNotActivated(_)));

    config.enabled = true;
    h.configs.upsert(config.clone()).await;
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::ChannelNotActivated(_)));

    config.media_server_id = MEDIA_SERVER_ID.to_string();
    h.configs.upsert(config).await;
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::MediaServerInstanceMissing(_)));

    let server = media_server(h.media.clone(), false);
    h.media_servers.register(server.clone()).await;
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::SupervisorNotRunning(_)));

    server.set_keeper_running(true);
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::MediaServerNotRunning(_)));

    // 停止推流走同一套校验
    let err = h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap_err();
    assert!(matches!(err, LiveError::MediaServerNotRunning(_)));

    assert_eq!(h.sip.invite_count(), 0);
    assert_eq!(h.media.total_calls(), 0);
}

#[tokio::test]
async fn test_start_confirms_and_caches_session() {
    let h = Harness::ready().await;

    let info = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();

    assert_eq!(info.app, "rtp");
    assert_eq!(info.stream, SESSION_KEY);
    assert_eq!(info.ssrc, 100000001);
    assert_eq!(info.rtp_port, ALLOCATED_PORT);
    assert_eq!(info.stream_port, 40000);
    assert_eq!(info.stream_ip, "10.0.0.9");
    assert_eq!(info.media_server_ip, "10.0.0.1");
    assert_eq!(info.push_socket_type, PushSocketType::Udp);
    assert!(info.stream_tcp_id.is_none());
    assert!(info.players.is_empty());
    assert_eq!(info.play_urls.len(), 9);
    assert!(info
        .play_urls
        .contains(&format!("http://10.0.0.1:80/rtp/{}.flv", SESSION_KEY)));

    let target = h.sip.last_target.lock().unwrap().clone().unwrap();
    assert_eq!(target.stream_port, ALLOCATED_PORT);
    assert_eq!(target.media_server_ip, "10.0.0.1");
    assert_eq!(target.ssrc, 100000001);

    let channel = h.channel().await;
    assert_eq!(channel.push_status().await, PushStatus::On);
    assert_eq!(channel.stream_info().await, Some(info.clone()));

    let entry = h.orchestrator.get_active_session(SESSION_KEY).await.unwrap();
    assert_eq!(entry.stream_info, info);
    assert_eq!(entry.config.channel_name, "gate");
    assert_eq!(h.bridge.pending_count(), 0);

    assert!(h.orchestrator.is_live(DEVICE_ID, CHANNEL_ID).await.unwrap());
    assert_eq!(
        h.orchestrator.get_stream_info(DEVICE_ID, CHANNEL_ID).await.unwrap(),
        info
    );
}

#[tokio::test]
async fn test_start_twice_invites_once() {
    let h = Harness::ready().await;

    let first = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    let second = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.sip.invite_count(), 1);
    assert_eq!(h.media.opens.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.len().await, 1);
}

#[tokio::test]
async fn test_start_recovers_out_of_band_live_state() {
    let source = Harness::ready().await;
    let info = source
        .orchestrator
        .start(DEVICE_ID, CHANNEL_ID, None)
        .await
        .unwrap();

    // 通道在推流但缓存为空
    let h = Harness::ready().await;
    h.channel().await.restore_live(info.clone()).await;
    assert!(h.cache.is_empty().await);

    let recovered = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();

    assert_eq!(recovered, info);
    assert_eq!(h.sip.invite_count(), 0);
    assert_eq!(h.media.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.cache.get(SESSION_KEY).await.unwrap().stream_info, info);
}

#[tokio::test]
async fn test_confirmation_timeout_leaves_no_trace() {
    let h = Harness::ready().await;
    h.sip.stop_confirming();

    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();

    assert!(matches!(err, LiveError::ConfirmationTimeout(_)));
    assert_eq!(h.sip.invite_count(), 1);
    assert!(h.cache.is_empty().await);
    assert!(!h.bridge.is_pending(SESSION_KEY));
    assert_eq!(h.bridge.pending_count(), 0);
    assert_eq!(h.channel().await.push_status().await, PushStatus::Off);

    // 申请到的端口被回收
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 1);
    assert_eq!(*h.media.released_ports.lock().unwrap(), vec![ALLOCATED_PORT]);
}

#[tokio::test]
async fn test_late_confirmation_is_dropped() {
    let h = Harness::ready().await;
    h.sip.stop_confirming();

    assert!(h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.is_err());
    assert!(!h.bridge.on_publish(on_publish(SESSION_KEY)));
    assert!(h.cache.is_empty().await);
}

#[tokio::test]
async fn test_port_stream_mismatch_skips_invite() {
    let h = Harness::ready().await;
    *h.media.stream_override.lock().unwrap() = Some("someone-else".to_string());

    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();

    assert!(matches!(err, LiveError::ProtocolInconsistency(_)));
    assert_eq!(h.sip.invite_count(), 0);
    assert_eq!(h.bridge.pending_count(), 0);
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_allocation_fault_is_wrapped() {
    let h = Harness::ready().await;
    h.media.fail_open.store(true, Ordering::SeqCst);

    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();

    assert_eq!(err.kind(), "RtpPortAllocationFailed");
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(h.sip.invite_count(), 0);
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invite_failure_releases_port() {
    let h = Harness::ready().await;
    h.sip.fail_invite.store(true, Ordering::SeqCst);

    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();

    assert!(matches!(err, LiveError::SipSignalingFailed(_)));
    assert!(err.to_string().contains("486"));
    assert_eq!(h.bridge.pending_count(), 0);
    assert!(h.cache.is_empty().await);
    assert_eq!(h.media.close_ports.load(Ordering::SeqCst), 1);
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_caller_port_is_used_and_never_released() {
    let h = Harness::ready().await;
    h.sip.stop_confirming();

    assert!(h.orchestrator.start(DEVICE_ID, CHANNEL_ID, Some(31000)).await.is_err());

    let target = h.sip.last_target.lock().unwrap().clone().unwrap();
    assert_eq!(target.stream_port, 31000);
    assert_eq!(h.media.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_caller_port_falls_through_to_allocation() {
    let h = Harness::ready().await;

    let info = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, Some(0)).await.unwrap();

    assert_eq!(info.rtp_port, ALLOCATED_PORT);
    assert_eq!(h.media.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fixed_port_mode() {
    let mut config = channel_config();
    config.default_rtp_port = true;
    let h = Harness::ready_with(config).await;

    let info = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    assert_eq!(info.rtp_port, 10000);
    assert_eq!(h.media.opens.load(Ordering::SeqCst), 0);

    h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap();
    assert_eq!(h.media.close_streams.load(Ordering::SeqCst), 1);
    assert_eq!(h.media.close_ports.load(Ordering::SeqCst), 0);
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 0);

    let server = h.media_servers.find(MEDIA_SERVER_ID).await.unwrap();
    server.set_rtp_proxy_port(Some(10002));
    let info = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    assert_eq!(info.rtp_port, 10002);
}

#[tokio::test]
async fn test_tcp_push_keeps_connection_id() {
    let mut config = channel_config();
    config.rtp_with_tcp = true;
    let h = Harness::ready_with(config).await;

    let info = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();

    assert_eq!(info.push_socket_type, PushSocketType::Tcp);
    assert_eq!(info.stream_tcp_id.as_deref(), Some("140"));
    let target = h.sip.last_target.lock().unwrap().clone().unwrap();
    assert_eq!(target.socket_type, PushSocketType::Tcp);
}

#[tokio::test]
async fn test_invalid_ssrc_is_protocol_error() {
    let h = Harness::empty();
    let device = h
        .devices
        .register(SipDevice::new(DEVICE_ID.to_string(), "192.168.1.100".to_string(), 5060))
        .await;
    device
        .add_channel(SipChannel::new(
            DEVICE_ID.to_string(),
            CHANNEL_ID.to_string(),
            SESSION_KEY.to_string(),
            "not-a-number".to_string(),
        ))
        .await;
    h.configs.upsert(channel_config()).await;
    h.media_servers.register(media_server(h.media.clone(), true)).await;

    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();

    assert!(matches!(err, LiveError::ProtocolInconsistency(_)));
    assert_eq!(h.sip.invite_count(), 0);
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let h = Harness::ready().await;

    h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap();

    assert_eq!(h.sip.bye_count(), 0);
    assert_eq!(h.media.total_calls(), 0);
}

#[tokio::test]
async fn test_stop_tears_down_and_clears_state() {
    let h = Harness::ready().await;
    h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();

    h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap();

    assert_eq!(h.sip.bye_count(), 1);
    assert_eq!(h.media.close_streams.load(Ordering::SeqCst), 1);
    assert_eq!(h.media.close_ports.load(Ordering::SeqCst), 1);
    assert_eq!(*h.media.released_ports.lock().unwrap(), vec![ALLOCATED_PORT]);

    let channel = h.channel().await;
    assert_eq!(channel.push_status().await, PushStatus::Off);
    assert!(channel.stream_info().await.is_none());
    assert!(h.cache.is_empty().await);

    let err = h.orchestrator.get_stream_info(DEVICE_ID, CHANNEL_ID).await.unwrap_err();
    assert!(matches!(err, LiveError::StreamNotActive(_)));
}

#[tokio::test]
async fn test_stop_ignores_teardown_failures() {
    let h = Harness::ready().await;
    h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    h.media.fail_teardown.store(true, Ordering::SeqCst);

    h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap();

    assert_eq!(h.sip.bye_count(), 1);
    assert_eq!(h.media.releases.load(Ordering::SeqCst), 1);
    assert!(h.cache.is_empty().await);
}

#[tokio::test]
async fn test_stop_bye_failure_keeps_state() {
    let h = Harness::ready().await;
    let info = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    h.sip.fail_bye.store(true, Ordering::SeqCst);

    let err = h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap_err();

    assert!(matches!(err, LiveError::SipSignalingFailed(_)));
    assert_eq!(h.channel().await.stream_info().await, Some(info));
    assert!(h.cache.get(SESSION_KEY).await.is_some());
}

#[tokio::test]
async fn test_concurrent_stops_send_one_bye() {
    let h = Harness::ready().await;
    h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    h.sip.delay_bye(Duration::from_millis(50));

    let a = h.orchestrator.clone();
    let b = h.orchestrator.clone();
    let (ra, rb) = tokio::join!(
        async move { a.stop(DEVICE_ID, CHANNEL_ID).await },
        async move { b.stop(DEVICE_ID, CHANNEL_ID).await },
    );

    assert!(ra.is_ok());
    assert!(rb.is_ok());
    assert_eq!(h.sip.bye_count(), 1);
}

#[tokio::test]
async fn test_start_after_stop_invites_again() {
    let h = Harness::ready().await;
    h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();
    h.orchestrator.stop(DEVICE_ID, CHANNEL_ID).await.unwrap();
    h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap();

    assert_eq!(h.sip.invite_count(), 2);
    assert_eq!(h.cache.len().await, 1);
}

#[tokio::test]
async fn test_device_queries() {
    let h = Harness::ready().await;

    let device = h.orchestrator.get_device(DEVICE_ID).await.unwrap();
    assert_eq!(device.ip, "192.168.1.100");
    assert_eq!(h.orchestrator.list_devices().await.len(), 1);

    let err = h.orchestrator.get_device("").await.unwrap_err();
    assert!(matches!(err, LiveError::InvalidParams(_)));

    let err = h.orchestrator.get_device("missing").await.unwrap_err();
    assert!(matches!(err, LiveError::DeviceNotFound(_)));

    let err = h.orchestrator.get_channel(DEVICE_ID, "missing").await.unwrap_err();
    assert!(matches!(err, LiveError::ChannelNotFound(_)));

    assert!(!h.orchestrator.is_live(DEVICE_ID, CHANNEL_ID).await.unwrap());
    assert!(h.orchestrator.list_active_sessions().await.is_empty());
}

#[tokio::test]
async fn test_reregistered_device_wins_lookup() {
    let h = Harness::ready().await;
    h.devices
        .register(SipDevice::new(DEVICE_ID.to_string(), "192.168.1.200".to_string(), 5060))
        .await;

    let device = h.orchestrator.get_device(DEVICE_ID).await.unwrap();
    assert_eq!(device.ip, "192.168.1.200");

    // 新注册的设备还没有通道
    let err = h.orchestrator.start(DEVICE_ID, CHANNEL_ID, None).await.unwrap_err();
    assert!(matches!(err, LiveError::ChannelNotFound(_)));
}
