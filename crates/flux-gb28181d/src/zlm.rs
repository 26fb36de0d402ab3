// ZLMediaKit HTTP API 客户端
// 端口由本地端口池分配，openRtpServer 绑定到会话的 stream_id

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flux_config::MediaServerConfig;
use flux_gb28181_live::{MediaServerApi, RtpPortPool, RtpPortRecord};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// getServerConfig 中关心的字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZlmServerConfig {
    pub rtp_proxy_port: Option<u16>,
}

pub struct ZlmMediaServerApi {
    media_server_id: String,
    base_url: String,
    secret: String,
    client: Client,
    pool: RtpPortPool,
}

impl ZlmMediaServerApi {
    pub fn new(config: &MediaServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("build http client")?;

        Ok(Self {
            media_server_id: config.media_server_id.clone(),
            base_url: config.api_url.clone(),
            secret: config.secret.clone(),
            client,
            pool: RtpPortPool::new(config.rtp_port_min, config.rtp_port_max)?,
        })
    }

    pub fn pool(&self) -> &RtpPortPool {
        &self.pool
    }

    fn url(&self, api: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/index/api/{}", base, api)
    }

    /// 调用 API，code != 0 视为失败
    async fn call(&self, api: &str, params: &[(&str, String)]) -> Result<Value> {
        let mut query: Vec<(&str, String)> = vec![("secret", self.secret.clone())];
        query.extend(params.iter().cloned());

        let resp = self
            .client
            .get(self.url(api))
            .query(&query)
            .send()
            .await
            .with_context(|| format!("{} request", api))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("{} failed: status={} body={}", api, status, text));
        }

        let v: Value = serde_json::from_str(&text)
            .map_err(|e| anyhow!("{} invalid json: {} (body={})", api, e, text))?;

        let code = v.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            let msg = v.get("msg").and_then(Value::as_str).unwrap_or_default();
            return Err(anyhow!("{} failed: code={} msg={}", api, code, msg));
        }

        Ok(v)
    }

    /// 读取服务器配置，同时作为健康检查
    pub async fn server_config(&self) -> Result<ZlmServerConfig> {
        let v = self.call("getServerConfig", &[]).await?;
        Ok(parse_server_config(&v))
    }
}

fn parse_server_config(v: &Value) -> ZlmServerConfig {
    let rtp_proxy_port = v
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("rtp_proxy.port"))
        .and_then(|port| match port {
            Value::String(s) => s.trim().parse::<u16>().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        })
        .filter(|port| *port != 0);

    ZlmServerConfig { rtp_proxy_port }
}

/// openRtpServer 返回的端口必须是端口池分配的端口
fn check_opened_port(v: &Value, requested: u16) -> Result<()> {
    match v.get("port").and_then(Value::as_u64) {
        None => Ok(()),
        Some(p) if p == u64::from(requested) => Ok(()),
        Some(p) => Err(anyhow!(
            "openRtpServer opened port {} instead of {}",
            p,
            requested
        )),
    }
}

#[async_trait]
impl MediaServerApi for ZlmMediaServerApi {
    async fn open_rtp_port(
        &self,
        media_server_id: &str,
        session_key: &str,
    ) -> Result<RtpPortRecord> {
        if media_server_id != self.media_server_id {
            return Err(anyhow!(
                "media server {} is served by {}",
                media_server_id,
                self.media_server_id
            ));
        }

        let port = self.pool.acquire(session_key).await?;

        // tcp_mode=1：同时接受 UDP 与 TCP 被动连接
        let result = self
            .call(
                "openRtpServer",
                &[
                    ("port", port.to_string()),
                    ("tcp_mode", "1".to_string()),
                    ("stream_id", session_key.to_string()),
                ],
            )
            .await;

        let v = match result {
            Ok(v) => v,
            Err(e) => {
                self.pool.release(port).await;
                return Err(e);
            }
        };

        if let Err(e) = check_opened_port(&v, port) {
            // 服务端已在其他端口监听
            if let Err(close_err) = self.close_rtp_port(session_key).await {
                tracing::warn!(target: "gb28181d", error = %close_err, "closeRtpServer after port mismatch failed");
            }
            self.pool.release(port).await;
            return Err(e);
        }

        tracing::debug!(
            target: "gb28181d",
            media_server_id = %self.media_server_id,
            session_key = %session_key,
            port,
            "openRtpServer ok"
        );

        Ok(RtpPortRecord {
            port,
            stream: session_key.to_string(),
        })
    }

    async fn close_rtp_port(&self, stream_id: &str) -> Result<()> {
        self.call("closeRtpServer", &[("stream_id", stream_id.to_string())])
            .await?;
        Ok(())
    }

    async fn close_streams(&self, app: &str, stream: &str, vhost: &str, force: bool) -> Result<()> {
        self.call(
            "close_streams",
            &[
                ("vhost", vhost.to_string()),
                ("app", app.to_string()),
                ("stream", stream.to_string()),
                ("force", if force { "1" } else { "0" }.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn release_rtp_port(&self, port: u16) -> Result<()> {
        if !self.pool.release(port).await {
            tracing::debug!(target: "gb28181d", port, "Rtp port was not held by pool");
        }
        Ok(())
    }
}
