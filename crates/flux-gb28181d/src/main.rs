use clap::Parser;
use flux_config::ConfigLoader;
use flux_gb28181_live::{
    sip::{SipProxyConfig, UdpSipProxy},
    DeviceRegistry, MediaServerRegistry,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod app;
mod http;
mod zlm;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 配置目录（读取 gb28181d.toml）
    #[arg(long, default_value = "./config")]
    config_dir: String,

    #[arg(long, default_value = "0.0.0.0:8081")]
    http_bind: String,

    /// 覆盖配置中的 SIP 监听地址
    #[arg(long)]
    sip_bind: Option<String>,

    /// 打印生效配置后退出
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let loader = ConfigLoader::new(&args.config_dir);
    let mut config = loader.load_validated()?;
    if let Some(sip_bind) = args.sip_bind {
        config.sip.bind_addr = sip_bind;
    }

    if args.print_config {
        println!("{}", config.to_toml_string()?);
        return Ok(());
    }

    tracing::info!(
        target: "gb28181d",
        name = %config.system.name,
        config = %loader.config_path().display(),
        media_servers = config.media_servers.len(),
        devices = config.devices.len(),
        channels = config.channels.len(),
        "Starting GB28181 live service"
    );

    let sip = UdpSipProxy::bind(SipProxyConfig {
        bind_addr: config.sip.bind_addr.clone(),
        sip_id: config.sip.sip_id.clone(),
        sip_domain: config.sip.sip_domain.clone(),
        local_ip: config.sip.local_ip.clone(),
    })
    .await?;
    tokio::spawn(sip.clone().run());

    let media_servers = MediaServerRegistry::new();
    let managed = app::register_media_servers(&media_servers, &config.media_servers).await?;
    tokio::spawn(app::run_health_checks(
        managed,
        config.media_servers.clone(),
        config.live.health_check_interval(),
    ));

    let orchestrator =
        app::build_orchestrator(&config, DeviceRegistry::new(), media_servers, sip).await;

    let router = http::router(http::AppState {
        orchestrator: Arc::new(orchestrator),
    });

    let addr = args.http_bind;
    tracing::info!(target: "gb28181d", "http listening on {}", addr);

    axum::Server::bind(
        &addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid http_bind {}: {}", addr, e))?,
    )
    .serve(router.into_make_service())
    .await?;

    Ok(())
}
