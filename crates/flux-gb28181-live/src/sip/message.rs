// SIP 消息编解码
// 头部按写入顺序保存，查找不区分大小写

use super::SipError;
use std::fmt;

/// SIP 方法（推流控制只用到会话相关方法）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SipMethod {
    Invite,
    Ack,
    Bye,
    Cancel,
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipMethod::Invite => write!(f, "INVITE"),
            SipMethod::Ack => write!(f, "ACK"),
            SipMethod::Bye => write!(f, "BYE"),
            SipMethod::Cancel => write!(f, "CANCEL"),
        }
    }
}

impl SipMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INVITE" => Some(SipMethod::Invite),
            "ACK" => Some(SipMethod::Ack),
            "BYE" => Some(SipMethod::Bye),
            "CANCEL" => Some(SipMethod::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    fn write_to(&self, out: &mut String, body: Option<&str>) {
        for (key, value) in &self.0 {
            if key.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            out.push_str(&format!("{}: {}\r\n", key, value));
        }

        match body {
            Some(body) => {
                out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
                out.push_str(body);
            }
            None => out.push_str("Content-Length: 0\r\n\r\n"),
        }
    }
}

/// SIP 请求
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub method: SipMethod,
    pub uri: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl SipRequest {
    pub fn new(method: SipMethod, uri: String) -> Self {
        Self {
            method,
            uri,
            headers: Headers::default(),
            body: None,
        }
    }

    pub fn add_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.add(key, value);
    }

    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get("Call-ID")
    }

    pub fn encode(&self) -> String {
        let mut out = format!("{} {} SIP/2.0\r\n", self.method, self.uri);
        self.headers.write_to(&mut out, self.body.as_deref());
        out
    }

    pub fn parse(s: &str) -> Result<Self, SipError> {
        let (start_line, headers, body) = split_message(s)?;

        let parts: Vec<&str> = start_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(SipError::Parse(format!("invalid request line: {}", start_line)));
        }

        let method = SipMethod::parse(parts[0])
            .ok_or_else(|| SipError::Parse(format!("unsupported method: {}", parts[0])))?;

        Ok(Self {
            method,
            uri: parts[1].to_string(),
            headers,
            body,
        })
    }
}

/// SIP 响应
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub status_code: u16,
    pub reason_phrase: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl SipResponse {
    pub fn new(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        Self {
            status_code,
            reason_phrase: reason_phrase.into(),
            headers: Headers::default(),
            body: None,
        }
    }

    pub fn add_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.add(key, value);
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get("Call-ID")
    }

    /// CSeq 中的方法名
    pub fn cseq_method(&self) -> Option<SipMethod> {
        self.headers
            .get("CSeq")
            .and_then(|v| v.split_whitespace().nth(1))
            .and_then(SipMethod::parse)
    }

    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status_code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn encode(&self) -> String {
        let mut out = format!("SIP/2.0 {} {}\r\n", self.status_code, self.reason_phrase);
        self.headers.write_to(&mut out, self.body.as_deref());
        out
    }

    pub fn parse(s: &str) -> Result<Self, SipError> {
        let (start_line, headers, body) = split_message(s)?;

        let parts: Vec<&str> = start_line.splitn(3, ' ').collect();
        if parts.len() < 2 || !parts[0].starts_with("SIP/") {
            return Err(SipError::Parse(format!("invalid status line: {}", start_line)));
        }

        let status_code = parts[1]
            .parse::<u16>()
            .map_err(|_| SipError::Parse(format!("invalid status code: {}", parts[1])))?;

        Ok(Self {
            status_code,
            reason_phrase: parts.get(2).map(|s| s.to_string()).unwrap_or_default(),
            headers,
            body,
        })
    }
}

/// SIP 消息（请求或响应）
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(s: &str) -> Result<Self, SipError> {
        if s.starts_with("SIP/") {
            Ok(SipMessage::Response(SipResponse::parse(s)?))
        } else {
            Ok(SipMessage::Request(SipRequest::parse(s)?))
        }
    }
}

fn split_message(s: &str) -> Result<(&str, Headers, Option<String>), SipError> {
    let (head, body) = match s.find("\r\n\r\n") {
        Some(pos) => (&s[..pos], &s[pos + 4..]),
        None => (s, ""),
    };

    let mut lines = head.split("\r\n");
    let start_line = lines
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| SipError::Parse("empty message".to_string()))?;

    let mut headers = Headers::default();
    for line in lines {
        if let Some(pos) = line.find(':') {
            headers.add(line[..pos].trim(), line[pos + 1..].trim());
        }
    }

    let body = if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    };

    Ok((start_line, headers, body))
}
