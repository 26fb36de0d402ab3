// GB28181 SIP 信令代理（UDP）
// 下发 INVITE/BYE，按 Call-ID 把设备响应交给等待中的事务

use super::message::{SipMessage, SipMethod, SipRequest, SipResponse};
use super::sdp::PlaySdp;
use super::SipError;
use crate::model::{PushTarget, SipChannel, SipDevice};
use crate::signaling::SipSignaling;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// SIP 代理配置
#[derive(Debug, Clone)]
pub struct SipProxyConfig {
    /// 监听地址
    pub bind_addr: String,

    /// 平台 SIP ID
    pub sip_id: String,

    /// SIP 域
    pub sip_domain: String,

    /// Via/Contact 中使用的本机地址
    pub local_ip: String,
}

impl Default for SipProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5060".to_string(),
            sip_id: "34020000002000000001".to_string(),
            sip_domain: "3402000000".to_string(),
            local_ip: "127.0.0.1".to_string(),
        }
    }
}

/// 已建立的点播对话
#[derive(Debug, Clone)]
struct Dialog {
    call_id: String,
    request_uri: String,
    from: String,
    to: String,
    remote: SocketAddr,
    cseq: u32,
}

type TransactionTable = DashMap<String, mpsc::UnboundedSender<SipResponse>>;

/// 事务登记，离开作用域时注销
struct Transaction {
    call_id: String,
    rx: mpsc::UnboundedReceiver<SipResponse>,
    table: Arc<TransactionTable>,
}

impl Transaction {
    fn open(table: &Arc<TransactionTable>, call_id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        table.insert(call_id.to_string(), tx);
        Self {
            call_id: call_id.to_string(),
            rx,
            table: table.clone(),
        }
    }

    /// 等待最终响应，跳过 1xx
    async fn final_response(
        &mut self,
        method: SipMethod,
        timeout: Duration,
    ) -> Result<SipResponse, SipError> {
        let call_id = self.call_id.clone();
        let rx = &mut self.rx;
        let wait = async {
            while let Some(resp) = rx.recv().await {
                if resp.is_provisional() {
                    tracing::debug!(
                        target: "gb28181::sip",
                        call_id = %call_id,
                        status = resp.status_code,
                        "Provisional response"
                    );
                    continue;
                }
                return Ok(resp);
            }
            Err(SipError::Closed(call_id.clone()))
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| SipError::Timeout {
                method,
                call_id: call_id.clone(),
            })?
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.table.remove(&self.call_id);
    }
}

/// UDP SIP 信令代理
pub struct UdpSipProxy {
    config: SipProxyConfig,
    socket: Arc<UdpSocket>,
    local_port: u16,
    transactions: Arc<TransactionTable>,
    /// key = device_id:channel_id
    dialogs: DashMap<String, Dialog>,
    cseq: AtomicU32,
}

impl UdpSipProxy {
    /// 绑定 UDP 端口
    pub async fn bind(config: SipProxyConfig) -> Result<Arc<Self>, SipError> {
        let socket = UdpSocket::bind(&config.bind_addr).await?;
        let local_port = socket.local_addr()?.port();

        tracing::info!(
            target: "gb28181::sip",
            bind_addr = %config.bind_addr,
            local_port,
            "GB28181 SIP proxy listening"
        );

        Ok(Arc::new(Self {
            config,
            socket: Arc::new(socket),
            local_port,
            transactions: Arc::new(DashMap::new()),
            dialogs: DashMap::new(),
            cseq: AtomicU32::new(1),
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SipError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn has_dialog(&self, device_id: &str, channel_id: &str) -> bool {
        self.dialogs.contains_key(&dialog_key(device_id, channel_id))
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    /// 接收循环，需在后台任务中运行
    pub async fn run(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let text = String::from_utf8_lossy(&buf[..len]).to_string();
                    if let Err(e) = self.dispatch(&text, addr).await {
                        tracing::warn!(target: "gb28181::sip", remote = %addr, error = %e, "Drop SIP packet");
                    }
                }
                Err(e) => {
                    tracing::error!(target: "gb28181::sip", error = %e, "Failed to receive UDP packet");
                }
            }
        }
    }

    async fn dispatch(&self, text: &str, addr: SocketAddr) -> Result<(), SipError> {
        match SipMessage::parse(text)? {
            SipMessage::Response(resp) => {
                let Some(call_id) = resp.call_id().map(str::to_string) else {
                    return Err(SipError::Parse("response without Call-ID".to_string()));
                };

                match self.transactions.get(&call_id) {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => {
                        tracing::debug!(
                            target: "gb28181::sip",
                            call_id = %call_id,
                            status = resp.status_code,
                            "Response for unknown transaction dropped"
                        );
                    }
                }
            }
            SipMessage::Request(req) => self.handle_request(req, addr).await?,
        }

        Ok(())
    }

    /// 设备主动发起的请求，目前只处理 BYE
    async fn handle_request(&self, req: SipRequest, addr: SocketAddr) -> Result<(), SipError> {
        if req.method != SipMethod::Bye {
            tracing::debug!(target: "gb28181::sip", method = %req.method, remote = %addr, "Unsupported request ignored");
            return Ok(());
        }

        if let Some(call_id) = req.call_id() {
            self.dialogs.retain(|_, d| d.call_id != call_id);
            tracing::info!(target: "gb28181::sip", call_id = %call_id, "Dialog closed by device");
        }

        let mut resp = SipResponse::new(200, "OK");
        for key in ["Via", "From", "To", "Call-ID", "CSeq"] {
            if let Some(value) = req.headers.get(key) {
                resp.add_header(key, value);
            }
        }
        self.socket.send_to(resp.encode().as_bytes(), addr).await?;

        Ok(())
    }

    fn next_cseq(&self) -> u32 {
        self.cseq.fetch_add(1, Ordering::Relaxed)
    }

    fn via(&self) -> String {
        format!(
            "SIP/2.0/UDP {}:{};rport;branch=z9hG4bK{}",
            self.config.local_ip,
            self.local_port,
            uuid::Uuid::new_v4().simple()
        )
    }

    /// 下发实时点播 INVITE，2xx 后回 ACK 并记录对话
    pub async fn send_invite(
        &self,
        device: &SipDevice,
        channel: &SipChannel,
        target: &PushTarget,
        timeout: Duration,
    ) -> Result<(), SipError> {
        let remote = device_addr(device)?;
        let request_uri = format!("sip:{}@{}:{}", channel.channel_id, device.ip, device.port);
        let call_id = format!("{}@{}", uuid::Uuid::new_v4().simple(), self.config.sip_domain);
        let from = format!(
            "<sip:{}@{}>;tag={}",
            self.config.sip_id,
            self.config.sip_domain,
            &uuid::Uuid::new_v4().simple().to_string()[..10]
        );
        let cseq = self.next_cseq();

        let mut request = SipRequest::new(SipMethod::Invite, request_uri.clone());
        request.add_header("Via", self.via());
        request.add_header("From", from.clone());
        request.add_header(
            "To",
            format!("<sip:{}@{}>", channel.channel_id, self.config.sip_domain),
        );
        request.add_header("Call-ID", call_id.clone());
        request.add_header("CSeq", format!("{} INVITE", cseq));
        request.add_header(
            "Contact",
            format!(
                "<sip:{}@{}:{}>",
                self.config.sip_id, self.config.local_ip, self.local_port
            ),
        );
        request.add_header("Max-Forwards", "70");
        request.add_header(
            "Subject",
            format!(
                "{}:{:010},{}:0",
                channel.channel_id, target.ssrc, self.config.sip_id
            ),
        );
        request.add_header("Content-Type", "application/sdp");
        request.set_body(PlaySdp::new(&self.config.sip_id, target).encode());

        let mut transaction = Transaction::open(&self.transactions, &call_id);
        self.socket
            .send_to(request.encode().as_bytes(), remote)
            .await?;

        tracing::info!(
            target: "gb28181::sip",
            device_id = %device.device_id,
            channel_id = %channel.channel_id,
            call_id = %call_id,
            port = target.stream_port,
            socket_type = %target.socket_type,
            "Sent INVITE"
        );

        let resp = transaction
            .final_response(SipMethod::Invite, timeout)
            .await?;

        if !resp.is_success() {
            return Err(SipError::Rejected {
                method: SipMethod::Invite,
                status: resp.status_code,
                reason: resp.reason_phrase,
            });
        }

        let to = resp
            .headers
            .get("To")
            .map(str::to_string)
            .unwrap_or_else(|| format!("<sip:{}@{}>", channel.channel_id, self.config.sip_domain));

        let mut ack = SipRequest::new(SipMethod::Ack, request_uri.clone());
        ack.add_header("Via", self.via());
        ack.add_header("From", from.clone());
        ack.add_header("To", to.clone());
        ack.add_header("Call-ID", call_id.clone());
        ack.add_header("CSeq", format!("{} ACK", cseq));
        ack.add_header("Max-Forwards", "70");
        self.socket.send_to(ack.encode().as_bytes(), remote).await?;

        self.dialogs.insert(
            dialog_key(&device.device_id, &channel.channel_id),
            Dialog {
                call_id,
                request_uri,
                from,
                to,
                remote,
                cseq,
            },
        );

        Ok(())
    }

    /// 在已有对话内发送 BYE，无对话时直接成功
    pub async fn send_bye(
        &self,
        device: &SipDevice,
        channel: &SipChannel,
        timeout: Duration,
    ) -> Result<(), SipError> {
        let key = dialog_key(&device.device_id, &channel.channel_id);
        let Some(dialog) = self.dialogs.get(&key).map(|d| d.clone()) else {
            tracing::warn!(
                target: "gb28181::sip",
                device_id = %device.device_id,
                channel_id = %channel.channel_id,
                "No dialog for channel, BYE skipped"
            );
            return Ok(());
        };

        let mut request = SipRequest::new(SipMethod::Bye, dialog.request_uri.clone());
        request.add_header("Via", self.via());
        request.add_header("From", dialog.from.clone());
        request.add_header("To", dialog.to.clone());
        request.add_header("Call-ID", dialog.call_id.clone());
        request.add_header("CSeq", format!("{} BYE", dialog.cseq + 1));
        request.add_header("Max-Forwards", "70");

        let mut transaction = Transaction::open(&self.transactions, &dialog.call_id);
        self.socket
            .send_to(request.encode().as_bytes(), dialog.remote)
            .await?;

        tracing::info!(
            target: "gb28181::sip",
            device_id = %device.device_id,
            channel_id = %channel.channel_id,
            call_id = %dialog.call_id,
            "Sent BYE"
        );

        let resp = transaction.final_response(SipMethod::Bye, timeout).await?;

        // 481 表示设备侧对话已不存在
        if !resp.is_success() && resp.status_code != 481 {
            return Err(SipError::Rejected {
                method: SipMethod::Bye,
                status: resp.status_code,
                reason: resp.reason_phrase,
            });
        }

        self.dialogs.remove(&key);
        Ok(())
    }
}

#[async_trait]
impl SipSignaling for UdpSipProxy {
    async fn invite(
        &self,
        device: &SipDevice,
        channel: &SipChannel,
        target: &PushTarget,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        self.send_invite(device, channel, target, timeout).await?;
        Ok(())
    }

    async fn de_invite(
        &self,
        device: &SipDevice,
        channel: &SipChannel,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        self.send_bye(device, channel, timeout).await?;
        Ok(())
    }
}

fn dialog_key(device_id: &str, channel_id: &str) -> String {
    format!("{}:{}", device_id, channel_id)
}

fn device_addr(device: &SipDevice) -> Result<SocketAddr, SipError> {
    format!("{}:{}", device.ip, device.port)
        .parse()
        .map_err(|_| SipError::InvalidAddress(format!("{}:{}", device.ip, device.port)))
}
