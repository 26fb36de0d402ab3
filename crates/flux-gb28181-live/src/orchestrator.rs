// 直播会话编排
// 开始/停止推流与只读查询

use crate::bridge::ConfirmationBridge;
use crate::cache::ActiveSessionCache;
use crate::error::{LiveError, Result};
use crate::model::{
    ActiveSessionEntry, OnPublishNotification, PushSocketType, PushStatus, PushTarget,
    SipChannel, SipDevice, StreamInfo,
};
use crate::play_url::build_play_urls;
use crate::precondition::{LiveContext, PreconditionValidator};
use crate::resource::{ResolvedRtpPort, RtpResourceManager, FALLBACK_RTP_PORT};
use crate::signaling::{SipSignaling, DEFAULT_SIP_TIMEOUT};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// 编排参数
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// INVITE/BYE 超时
    pub sip_timeout: Duration,
    /// 等待 on_publish 回调的超时
    pub confirmation_timeout: Duration,
    /// 固定端口模式下流媒体未配置端口时使用
    pub fallback_rtp_port: u16,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            sip_timeout: DEFAULT_SIP_TIMEOUT,
            confirmation_timeout: Duration::from_millis(5000),
            fallback_rtp_port: FALLBACK_RTP_PORT,
        }
    }
}

/// 直播会话编排器
pub struct LiveSessionOrchestrator {
    validator: PreconditionValidator,
    sip: Arc<dyn SipSignaling>,
    bridge: ConfirmationBridge,
    cache: ActiveSessionCache,
    resources: RtpResourceManager,
    options: LiveOptions,
}

impl LiveSessionOrchestrator {
    pub fn new(
        validator: PreconditionValidator,
        sip: Arc<dyn SipSignaling>,
        bridge: ConfirmationBridge,
        cache: ActiveSessionCache,
        options: LiveOptions,
    ) -> Self {
        let resources = RtpResourceManager::new(options.fallback_rtp_port);
        Self {
            validator,
            sip,
            bridge,
            cache,
            resources,
            options,
        }
    }

    pub fn bridge(&self) -> &ConfirmationBridge {
        &self.bridge
    }

    pub fn cache(&self) -> &ActiveSessionCache {
        &self.cache
    }

    pub fn options(&self) -> &LiveOptions {
        &self.options
    }

    /// 开始推流
    ///
    /// 已在推流时直接返回已有流信息；否则下发 INVITE 并等待流媒体的 on_publish 回调。
    pub async fn start(
        &self,
        device_id: &str,
        channel_id: &str,
        rtp_port: Option<u16>,
    ) -> Result<StreamInfo> {
        let result = self.start_inner(device_id, channel_id, rtp_port).await;

        match &result {
            Ok(info) => tracing::info!(
                target: "gb28181::live",
                device_id = %device_id,
                channel_id = %channel_id,
                stream = %info.stream,
                rtp_port = info.rtp_port,
                "Live stream started"
            ),
            Err(e) => tracing::warn!(
                target: "gb28181::live",
                device_id = %device_id,
                channel_id = %channel_id,
                code = e.code(),
                error = %e,
                "Start live stream failed"
            ),
        }

        result
    }

    async fn start_inner(
        &self,
        device_id: &str,
        channel_id: &str,
        rtp_port: Option<u16>,
    ) -> Result<StreamInfo> {
        let ctx = self.validator.check(device_id, channel_id).await?;

        if let Some(entry) = self.cache.get(ctx.session_key()).await {
            tracing::debug!(
                target: "gb28181::live",
                session_key = %ctx.session_key(),
                "Session already active, returning cached stream info"
            );
            return Ok(entry.stream_info);
        }

        if let Some(info) = ctx.channel.live_stream_info().await {
            tracing::info!(
                target: "gb28181::live",
                session_key = %ctx.session_key(),
                "Recovered live channel state into session cache"
            );
            self.cache
                .upsert(ActiveSessionEntry::new(ctx.config.clone(), info.clone()))
                .await;
            return Ok(info);
        }

        let resolved = self.resources.resolve(&ctx, rtp_port).await?;

        match self.invite_and_confirm(&ctx, &resolved).await {
            Ok(info) => Ok(info),
            Err(e) => {
                self.resources.release_allocated(&ctx, &resolved).await;
                Err(e)
            }
        }
    }

    async fn invite_and_confirm(
        &self,
        ctx: &LiveContext,
        resolved: &ResolvedRtpPort,
    ) -> Result<StreamInfo> {
        if resolved.record.stream.trim() != ctx.channel.stream {
            return Err(LiveError::protocol(format!(
                "rtp port stream {:?} does not match channel stream {:?}",
                resolved.record.stream, ctx.channel.stream
            )));
        }

        let ssrc: u32 = ctx.channel.ssrc_id.trim().parse().map_err(|_| {
            LiveError::protocol(format!("invalid ssrc {:?}", ctx.channel.ssrc_id))
        })?;

        let socket_type = ctx.config.push_socket_type();
        let target = PushTarget {
            stream_port: resolved.record.port,
            media_server_ip: ctx.media_server.ipv4_address.clone(),
            socket_type,
            ssrc,
        };

        // 先登记等待再发 INVITE
        let pending = self.bridge.register(ctx.session_key());

        self.sip
            .invite(&ctx.device, &ctx.channel, &target, self.options.sip_timeout)
            .await
            .map_err(|e| LiveError::signaling(format!("{:#}", e)))?;

        tracing::debug!(
            target: "gb28181::live",
            session_key = %ctx.session_key(),
            wait_key = %pending.wait_key(),
            "Invite accepted, waiting for on_publish"
        );

        let payload = pending.wait(self.options.confirmation_timeout).await?;

        let _guard = ctx.channel.lock().await;

        let info = self.build_stream_info(ctx, resolved, socket_type, ssrc, payload);
        ctx.channel.mark_live(info.clone()).await;
        self.cache
            .upsert(ActiveSessionEntry::new(ctx.config.clone(), info.clone()))
            .await;

        Ok(info)
    }

    fn build_stream_info(
        &self,
        ctx: &LiveContext,
        resolved: &ResolvedRtpPort,
        socket_type: PushSocketType,
        ssrc: u32,
        payload: OnPublishNotification,
    ) -> StreamInfo {
        let play_urls = build_play_urls(
            &ctx.media_server,
            &payload.app,
            &payload.stream,
            &payload.vhost,
        );

        let stream_tcp_id = match socket_type {
            PushSocketType::Tcp => Some(payload.id),
            PushSocketType::Udp => None,
        };

        StreamInfo {
            app: payload.app,
            stream: payload.stream,
            vhost: payload.vhost,
            ssrc,
            rtp_port: resolved.record.port,
            stream_port: payload.port,
            stream_ip: payload.ip,
            media_server_id: ctx.media_server.media_server_id.clone(),
            media_server_ip: ctx.media_server.ipv4_address.clone(),
            push_socket_type: socket_type,
            stream_tcp_id,
            params: payload.params,
            start_time: Utc::now(),
            play_urls,
            players: Vec::new(),
        }
    }

    /// 停止推流
    ///
    /// 未在推流时直接成功；资源清理失败不影响结果，结果以 BYE 为准。
    pub async fn stop(&self, device_id: &str, channel_id: &str) -> Result<()> {
        let result = self.stop_inner(device_id, channel_id).await;

        match &result {
            Ok(()) => tracing::info!(
                target: "gb28181::live",
                device_id = %device_id,
                channel_id = %channel_id,
                "Live stream stopped"
            ),
            Err(e) => tracing::warn!(
                target: "gb28181::live",
                device_id = %device_id,
                channel_id = %channel_id,
                code = e.code(),
                error = %e,
                "Stop live stream failed"
            ),
        }

        result
    }

    async fn stop_inner(&self, device_id: &str, channel_id: &str) -> Result<()> {
        let ctx = self.validator.check(device_id, channel_id).await?;

        if ctx.channel.push_status().await != PushStatus::On {
            return Ok(());
        }

        let _guard = ctx.channel.lock().await;

        // 等锁期间可能已被其他调用停止
        let Some(info) = ctx.channel.live_stream_info().await else {
            return Ok(());
        };

        let report = self.resources.teardown(&ctx, &info).await;
        if !report.is_clean() {
            tracing::debug!(
                target: "gb28181::live",
                session_key = %ctx.session_key(),
                failures = report.failures.len(),
                "Teardown finished with ignored failures"
            );
        }

        self.sip
            .de_invite(&ctx.device, &ctx.channel, self.options.sip_timeout)
            .await
            .map_err(|e| LiveError::signaling(format!("{:#}", e)))?;

        ctx.channel.mark_idle().await;
        self.cache.remove(ctx.session_key()).await;

        Ok(())
    }

    /// 获取正在推流的流信息
    pub async fn get_stream_info(&self, device_id: &str, channel_id: &str) -> Result<StreamInfo> {
        let (_, channel) = self.validator.locate(device_id, channel_id).await?;
        channel
            .live_stream_info()
            .await
            .ok_or_else(|| LiveError::StreamNotActive(format!("{}-{}", device_id, channel_id)))
    }

    pub async fn is_live(&self, device_id: &str, channel_id: &str) -> Result<bool> {
        let (_, channel) = self.validator.locate(device_id, channel_id).await?;
        Ok(channel.push_status().await == PushStatus::On)
    }

    pub async fn get_channel(&self, device_id: &str, channel_id: &str) -> Result<Arc<SipChannel>> {
        let (_, channel) = self.validator.locate(device_id, channel_id).await?;
        Ok(channel)
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Arc<SipDevice>> {
        if device_id.is_empty() {
            return Err(LiveError::invalid_params("device_id is empty"));
        }
        self.validator
            .devices()
            .find(device_id)
            .await
            .ok_or_else(|| LiveError::DeviceNotFound(device_id.to_string()))
    }

    /// 按注册顺序列出设备
    pub async fn list_devices(&self) -> Vec<Arc<SipDevice>> {
        self.validator.devices().list().await
    }

    pub async fn list_active_sessions(&self) -> Vec<ActiveSessionEntry> {
        self.cache.list().await
    }

    pub async fn get_active_session(&self, session_key: &str) -> Option<ActiveSessionEntry> {
        self.cache.get(session_key).await
    }
}
