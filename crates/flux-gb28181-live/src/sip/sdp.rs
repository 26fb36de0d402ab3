// GB28181 实时点播 SDP

use crate::model::{PushSocketType, PushTarget};

/// RTP 映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding_name: &'static str,
    pub clock_rate: u32,
}

const PLAY_RTPMAP: [RtpMap; 3] = [
    RtpMap {
        payload_type: 96,
        encoding_name: "PS",
        clock_rate: 90000,
    },
    RtpMap {
        payload_type: 98,
        encoding_name: "H264",
        clock_rate: 90000,
    },
    RtpMap {
        payload_type: 97,
        encoding_name: "MPEG4",
        clock_rate: 90000,
    },
];

/// 实时点播 SDP（s=Play）
#[derive(Debug, Clone)]
pub struct PlaySdp {
    /// o= 行的会话源（平台 SIP ID）
    pub origin: String,
    /// 收流地址
    pub address: String,
    pub port: u16,
    pub socket_type: PushSocketType,
    pub ssrc: u32,
}

impl PlaySdp {
    pub fn new(origin: &str, target: &PushTarget) -> Self {
        Self {
            origin: origin.to_string(),
            address: target.media_server_ip.clone(),
            port: target.stream_port,
            socket_type: target.socket_type,
            ssrc: target.ssrc,
        }
    }

    pub fn encode(&self) -> String {
        let mut sdp = String::new();

        sdp.push_str("v=0\r\n");
        sdp.push_str(&format!("o={} 0 0 IN IP4 {}\r\n", self.origin, self.address));
        sdp.push_str("s=Play\r\n");
        sdp.push_str(&format!("c=IN IP4 {}\r\n", self.address));
        sdp.push_str("t=0 0\r\n");

        let protocol = match self.socket_type {
            PushSocketType::Udp => "RTP/AVP",
            PushSocketType::Tcp => "TCP/RTP/AVP",
        };
        let formats: Vec<String> = PLAY_RTPMAP
            .iter()
            .map(|m| m.payload_type.to_string())
            .collect();
        sdp.push_str(&format!(
            "m=video {} {} {}\r\n",
            self.port,
            protocol,
            formats.join(" ")
        ));

        sdp.push_str("a=recvonly\r\n");
        for map in &PLAY_RTPMAP {
            sdp.push_str(&format!(
                "a=rtpmap:{} {}/{}\r\n",
                map.payload_type, map.encoding_name, map.clock_rate
            ));
        }

        // 设备主动连接收流端口
        if self.socket_type == PushSocketType::Tcp {
            sdp.push_str("a=setup:passive\r\n");
            sdp.push_str("a=connection:new\r\n");
        }

        sdp.push_str(&format!("y={:010}\r\n", self.ssrc));

        sdp
    }
}
