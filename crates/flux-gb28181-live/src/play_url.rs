// 播放地址生成

use crate::model::MediaServerInstance;

/// 默认 vhost（不区分大小写）
const DEFAULT_VHOST: &str = "__defaultvhost__";

/// vhost 查询后缀，空或默认 vhost 时省略
pub fn vhost_suffix(vhost: &str) -> String {
    let vhost = vhost.trim();
    if vhost.is_empty() || vhost.eq_ignore_ascii_case(DEFAULT_VHOST) {
        String::new()
    } else {
        format!("?vhost={}", vhost)
    }
}

struct Schemes<'a> {
    ws: &'a str,
    http: &'a str,
    rtsp: &'a str,
    rtmp: &'a str,
    http_port: u16,
    rtsp_port: u16,
    rtmp_port: u16,
}

fn push_set(urls: &mut Vec<String>, s: &Schemes<'_>, host: &str, path: &str, suffix: &str) {
    let web = format!("{}:{}/{}", host, s.http_port, path);

    urls.push(format!("{}://{}.flv{}", s.ws, web, suffix));
    urls.push(format!("{}://{}.flv{}", s.http, web, suffix));
    urls.push(format!("{}://{}:{}/{}{}", s.rtsp, host, s.rtsp_port, path, suffix));
    urls.push(format!("{}://{}:{}/{}{}", s.rtmp, host, s.rtmp_port, path, suffix));
    urls.push(format!("{}://{}/hls.m3u8{}", s.http, web, suffix));
    urls.push(format!("{}://{}.live.ts{}", s.http, web, suffix));
    urls.push(format!("{}://{}.live.ts{}", s.ws, web, suffix));
    urls.push(format!("{}://{}.live.mp4{}", s.http, web, suffix));
    urls.push(format!("{}://{}.live.mp4{}", s.ws, web, suffix));
}

/// 生成播放地址列表
///
/// 启用 TLS 时加密地址在前，普通地址在后，顺序固定。
pub fn build_play_urls(
    media_server: &MediaServerInstance,
    app: &str,
    stream: &str,
    vhost: &str,
) -> Vec<String> {
    let host = media_server.ipv4_address.as_str();
    let ports = &media_server.ports;
    let path = format!("{}/{}", app, stream);
    let suffix = vhost_suffix(vhost);
    let mut urls = Vec::with_capacity(18);

    if media_server.use_ssl {
        let secure = Schemes {
            ws: "wss",
            http: "https",
            rtsp: "rtsps",
            rtmp: "rtmps",
            http_port: ports.https,
            rtsp_port: ports.rtsps,
            rtmp_port: ports.rtmps,
        };
        push_set(&mut urls, &secure, host, &path, &suffix);
    }

    let plain = Schemes {
        ws: "ws",
        http: "http",
        rtsp: "rtsp",
        rtmp: "rtmp",
        http_port: ports.http,
        rtsp_port: ports.rtsp,
        rtmp_port: ports.rtmp,
    };
    push_set(&mut urls, &plain, host, &path, &suffix);

    urls
}
