// RTP 收流资源管理
// 端口解析/申请、失败回收、停止推流时的资源清理

use crate::error::{LiveError, Result};
use crate::media::RtpPortRecord;
use crate::model::StreamInfo;
use crate::precondition::LiveContext;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

/// 流媒体服务器未配置固定端口时使用
pub const FALLBACK_RTP_PORT: u16 = 10000;

/// 端口来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    /// 调用方指定
    Caller,
    /// 向流媒体服务器申请
    Allocated,
    /// 固定端口模式
    Fixed,
}

/// 解析后的 RTP 端口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRtpPort {
    pub record: RtpPortRecord,
    pub source: PortSource,
}

/// 停止推流时的清理步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    CloseStreams,
    CloseRtpPort,
    ReleaseRtpPort,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownStep::CloseStreams => write!(f, "close_streams"),
            TeardownStep::CloseRtpPort => write!(f, "close_rtp_port"),
            TeardownStep::ReleaseRtpPort => write!(f, "release_rtp_port"),
        }
    }
}

/// 清理结果，失败只记录不影响操作结果
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub attempted: Vec<TeardownStep>,
    pub failures: Vec<(TeardownStep, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// RTP 资源管理器
#[derive(Debug, Clone)]
pub struct RtpResourceManager {
    fallback_port: u16,
}

impl Default for RtpResourceManager {
    fn default() -> Self {
        Self::new(FALLBACK_RTP_PORT)
    }
}

impl RtpResourceManager {
    pub fn new(fallback_port: u16) -> Self {
        Self { fallback_port }
    }

    /// 解析本次会话使用的 RTP 端口
    ///
    /// 顺序：调用方指定的非零端口 > 非固定端口模式下向流媒体申请 > 固定端口。
    pub async fn resolve(
        &self,
        ctx: &LiveContext,
        requested: Option<u16>,
    ) -> Result<ResolvedRtpPort> {
        if let Some(port) = requested.filter(|p| *p != 0) {
            return Ok(ResolvedRtpPort {
                record: RtpPortRecord {
                    port,
                    stream: ctx.config.session_key.clone(),
                },
                source: PortSource::Caller,
            });
        }

        if !ctx.config.default_rtp_port {
            let record = ctx
                .media_server
                .api()
                .open_rtp_port(&ctx.media_server.media_server_id, &ctx.config.session_key)
                .await
                .map_err(|e| LiveError::rtp_allocation(&e))?;

            tracing::debug!(
                target: "gb28181::live",
                session_key = %ctx.config.session_key,
                port = record.port,
                "Rtp port allocated"
            );

            return Ok(ResolvedRtpPort {
                record,
                source: PortSource::Allocated,
            });
        }

        let port = ctx
            .media_server
            .rtp_proxy_port()
            .unwrap_or(self.fallback_port);

        Ok(ResolvedRtpPort {
            record: RtpPortRecord {
                port,
                stream: ctx.config.session_key.clone(),
            },
            source: PortSource::Fixed,
        })
    }

    /// 启动失败时回收本次申请的端口，调用方指定或固定端口不回收
    pub async fn release_allocated(&self, ctx: &LiveContext, resolved: &ResolvedRtpPort) {
        if resolved.source != PortSource::Allocated {
            return;
        }

        let api = ctx.media_server.api();
        if let Err(e) = api.close_rtp_port(&resolved.record.stream).await {
            tracing::warn!(
                target: "gb28181::live",
                session_key = %ctx.config.session_key,
                error = %e,
                "Close rtp port after failed start failed"
            );
        }
        if let Err(e) = api.release_rtp_port(resolved.record.port).await {
            tracing::warn!(
                target: "gb28181::live",
                session_key = %ctx.config.session_key,
                port = resolved.record.port,
                error = %e,
                "Release rtp port after failed start failed"
            );
        }
    }

    /// 停止推流的资源清理，逐步执行并记录失败
    pub async fn teardown(&self, ctx: &LiveContext, info: &StreamInfo) -> TeardownReport {
        let mut steps = vec![TeardownStep::CloseStreams];
        if !ctx.config.default_rtp_port {
            steps.push(TeardownStep::CloseRtpPort);
            steps.push(TeardownStep::ReleaseRtpPort);
        }

        let api = ctx.media_server.api();
        let mut report = TeardownReport::default();

        for step in steps {
            let outcome = match step {
                TeardownStep::CloseStreams => {
                    api.close_streams(&info.app, &ctx.channel.stream, &info.vhost, true)
                        .await
                }
                TeardownStep::CloseRtpPort => api.close_rtp_port(&ctx.channel.stream).await,
                TeardownStep::ReleaseRtpPort => api.release_rtp_port(info.rtp_port).await,
            };

            report.attempted.push(step);
            if let Err(e) = outcome {
                tracing::warn!(
                    target: "gb28181::live",
                    session_key = %ctx.config.session_key,
                    %step,
                    error = %e,
                    "Teardown step failed, ignored"
                );
                report.failures.push((step, format!("{:#}", e)));
            }
        }

        report
    }
}

#[derive(Debug, Default)]
struct PoolState {
    /// port -> session_key
    held: HashMap<u16, String>,
    /// session_key -> port
    by_key: HashMap<String, u16>,
}

/// RTP 端口池
///
/// 只分配偶数端口（RTCP 使用 port + 1），同一会话重复申请返回同一端口。
#[derive(Debug)]
pub struct RtpPortPool {
    min: u16,
    max: u16,
    state: Mutex<PoolState>,
}

impl RtpPortPool {
    /// 端口范围 [min, max]，两端都可分配
    pub fn new(min: u16, max: u16) -> anyhow::Result<Self> {
        let first = min.saturating_add(min % 2);
        // RTCP 需要 port + 1
        if min == 0 || first > max || first == u16::MAX {
            anyhow::bail!("invalid rtp port range {}-{}", min, max);
        }

        Ok(Self {
            min: first,
            max,
            state: Mutex::new(PoolState::default()),
        })
    }

    /// 为会话申请端口
    pub async fn acquire(&self, session_key: &str) -> anyhow::Result<u16> {
        let mut state = self.state.lock().await;
        if let Some(port) = state.by_key.get(session_key) {
            return Ok(*port);
        }

        let last = self.max.min(u16::MAX - 1);
        let mut port = self.min;
        while port <= last {
            if !state.held.contains_key(&port) {
                state.held.insert(port, session_key.to_string());
                state.by_key.insert(session_key.to_string(), port);
                return Ok(port);
            }
            port = match port.checked_add(2) {
                Some(p) => p,
                None => break,
            };
        }

        anyhow::bail!("rtp port pool {}-{} exhausted", self.min, self.max)
    }

    /// 归还端口，端口未被占用时返回 false
    pub async fn release(&self, port: u16) -> bool {
        let mut state = self.state.lock().await;
        match state.held.remove(&port) {
            Some(key) => {
                state.by_key.remove(&key);
                true
            }
            None => false,
        }
    }

    pub async fn held_port(&self, session_key: &str) -> Option<u16> {
        self.state.lock().await.by_key.get(session_key).copied()
    }

    pub async fn in_use(&self) -> usize {
        self.state.lock().await.held.len()
    }
}
