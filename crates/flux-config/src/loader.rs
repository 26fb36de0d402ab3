use anyhow::{anyhow, Result};
use config::{Config, File, FileFormat};
use flux_gb28181_live::model::UNKNOWN_MEDIA_SERVER;
use flux_gb28181_live::RtpPortPool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::LiveServiceConfig;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "gb28181d.toml";

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// 加载服务配置
    pub fn load(&self) -> Result<LiveServiceConfig> {
        let config_path = self.config_path();

        if !config_path.exists() {
            // 如果配置文件不存在，返回默认配置
            return Ok(LiveServiceConfig::default());
        }

        let config = Config::builder()
            .add_source(File::new(
                config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 加载并验证
    pub fn load_validated(&self) -> Result<LiveServiceConfig> {
        let config = self.load()?;
        validate(&config)?;
        Ok(config)
    }
}

/// 验证配置
pub fn validate(config: &LiveServiceConfig) -> Result<()> {
    if config.live.sip_timeout_ms == 0 {
        return Err(anyhow!("live.sip_timeout_ms must be greater than 0"));
    }

    if config.live.confirmation_timeout_ms == 0 {
        return Err(anyhow!("live.confirmation_timeout_ms must be greater than 0"));
    }

    if config.live.fallback_rtp_port == 0 {
        return Err(anyhow!("live.fallback_rtp_port must be greater than 0"));
    }

    if config.live.health_check_interval_secs == 0 {
        return Err(anyhow!("live.health_check_interval_secs must be greater than 0"));
    }

    let mut server_ids = HashSet::new();
    for server in &config.media_servers {
        if server.media_server_id.is_empty() {
            return Err(anyhow!("media_servers: media_server_id cannot be empty"));
        }

        // 与端口池使用同一规则
        RtpPortPool::new(server.rtp_port_min, server.rtp_port_max)
            .map_err(|e| anyhow!("media server {}: {}", server.media_server_id, e))?;

        server_ids.insert(server.media_server_id.as_str());
    }

    for channel in &config.channels {
        if channel.session_key.is_empty() {
            return Err(anyhow!(
                "channel {}-{}: session_key cannot be empty",
                channel.device_id,
                channel.channel_id
            ));
        }

        if !channel.media_server_id.contains(UNKNOWN_MEDIA_SERVER)
            && !server_ids.contains(channel.media_server_id.as_str())
        {
            return Err(anyhow!(
                "channel {}: media server {} is not declared",
                channel.session_key,
                channel.media_server_id
            ));
        }
    }

    Ok(())
}
