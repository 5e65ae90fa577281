//! SIP message types and parsing

use crate::domain::shared::error::DomainError;
use rsip::{Headers, Request, Response};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("No dialog for session {0}")]
    NoDialog(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

impl From<SipError> for DomainError {
    fn from(err: SipError) -> Self {
        DomainError::Transport(err.to_string())
    }
}

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Notify,
    Refer,
    Message,
    Subscribe,
    Update,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Update => "UPDATE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "REGISTER" => Some(SipMethod::Register),
            "INVITE" => Some(SipMethod::Invite),
            "ACK" => Some(SipMethod::Ack),
            "CANCEL" => Some(SipMethod::Cancel),
            "BYE" => Some(SipMethod::Bye),
            "OPTIONS" => Some(SipMethod::Options),
            "INFO" => Some(SipMethod::Info),
            "NOTIFY" => Some(SipMethod::Notify),
            "REFER" => Some(SipMethod::Refer),
            "MESSAGE" => Some(SipMethod::Message),
            "SUBSCRIBE" => Some(SipMethod::Subscribe),
            "UPDATE" => Some(SipMethod::Update),
            _ => None,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Long name of a compact header form (RFC 3261 §7.3.3)
fn expand_compact(name: &str) -> &str {
    match name {
        "i" => "call-id",
        "f" => "from",
        "t" => "to",
        "v" => "via",
        "m" => "contact",
        "l" => "content-length",
        "c" => "content-type",
        "r" => "refer-to",
        "b" => "referred-by",
        other => other,
    }
}

/// Values of every header called `name`, in message order
pub fn header_values(headers: &Headers, name: &str) -> Vec<String> {
    let wanted = name.to_ascii_lowercase();

    headers
        .iter()
        .filter_map(|header| {
            let line = header.to_string();
            let (header_name, value) = line.split_once(':')?;
            let header_name = header_name.trim().to_ascii_lowercase();
            (expand_compact(&header_name) == wanted).then(|| value.trim().to_string())
        })
        .collect()
}

/// Value of the first header called `name`
pub fn header_value(headers: &Headers, name: &str) -> Option<String> {
    header_values(headers, name).into_iter().next()
}

/// Parameter of a name-addr header value, e.g. the `tag` of a From header
pub fn header_param(value: &str, param: &str) -> Option<String> {
    let params = match value.rfind('>') {
        Some(end) => &value[end + 1..],
        None => value,
    };

    params.split(';').skip(1).find_map(|part| {
        let (key, val) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(param)
            .then(|| val.trim().to_string())
    })
}

/// URI of a name-addr (`"Bob" <sip:bob@host>;tag=x` gives `sip:bob@host`)
pub fn addr_spec(value: &str) -> String {
    match (value.find('<'), value.find('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].to_string(),
        _ => value.split(';').next().unwrap_or(value).trim().to_string(),
    }
}

/// Name-addr without its parameters (drops the tag)
pub fn strip_params(value: &str) -> String {
    match value.rfind('>') {
        Some(end) => value[..=end].trim().to_string(),
        None => value.split(';').next().unwrap_or(value).trim().to_string(),
    }
}

/// CSeq number and method
pub fn parse_cseq(value: &str) -> Option<(u32, SipMethod)> {
    let mut parts = value.split_whitespace();
    let seq = parts.next()?.parse().ok()?;
    let method = SipMethod::from_name(parts.next()?)?;
    Some((seq, method))
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::from_name(&self.inner.method.to_string())
    }

    pub fn method_name(&self) -> String {
        self.inner.method.to_string()
    }

    pub fn uri(&self) -> String {
        self.inner.uri.to_string()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.inner.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        self.header("Call-ID")
    }

    pub fn from_tag(&self) -> Option<String> {
        self.header("From").and_then(|from| header_param(&from, "tag"))
    }

    pub fn to_tag(&self) -> Option<String> {
        self.header("To").and_then(|to| header_param(&to, "tag"))
    }

    pub fn cseq(&self) -> Option<(u32, SipMethod)> {
        self.header("CSeq").and_then(|cseq| parse_cseq(&cseq))
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
    reason: String,
}

impl SipResponse {
    pub fn new(inner: Response, reason: impl Into<String>) -> Self {
        Self {
            inner,
            reason: reason.into(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;

        // rsip only keeps the code, the phrase comes from the status line
        let reason = String::from_utf8_lossy(data)
            .lines()
            .next()
            .and_then(|line| line.splitn(3, ' ').nth(2))
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(Self::new(response, reason))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.inner.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        self.header("Call-ID")
    }

    pub fn to_tag(&self) -> Option<String> {
        self.header("To").and_then(|to| header_param(&to, "tag"))
    }

    pub fn cseq(&self) -> Option<(u32, SipMethod)> {
        self.header("CSeq").and_then(|cseq| parse_cseq(&cseq))
    }

    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status_code())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        if data.starts_with(b"SIP/") {
            return SipResponse::parse(data).map(SipMessage::Response);
        }

        SipRequest::parse(data).map(SipMessage::Request)
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invite_request() {
        let data = b"INVITE sip:alice@example.com SIP/2.0\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
                     From: \"Bob\" <sip:999@example.com>;tag=1928301774\r\n\
                     To: <sip:alice@example.com>\r\n\
                     Call-ID: a84b4c76e66710@pc33.example.com\r\n\
                     CSeq: 314159 INVITE\r\n\
                     Contact: <sip:999@192.168.1.100:5060>\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        assert!(msg.is_request());

        let req = msg.as_request().unwrap();
        assert_eq!(req.method(), Some(SipMethod::Invite));
        assert_eq!(
            req.call_id(),
            Some("a84b4c76e66710@pc33.example.com".to_string())
        );
        assert_eq!(req.cseq(), Some((314159, SipMethod::Invite)));
        assert_eq!(req.from_tag(), Some("1928301774".to_string()));
        assert_eq!(req.to_tag(), None);
    }

    #[test]
    fn test_parse_response() {
        let data = b"SIP/2.0 486 Busy Here\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
                     From: <sip:alice@example.com>;tag=1928301774\r\n\
                     To: <sip:bob@example.com>;tag=a6c85cf\r\n\
                     Call-ID: a84b4c76e66710@pc33.example.com\r\n\
                     CSeq: 1 INVITE\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        let resp = msg.as_response().unwrap();
        assert_eq!(resp.status_code(), 486);
        assert_eq!(resp.reason(), "Busy Here");
        assert_eq!(resp.to_tag(), Some("a6c85cf".to_string()));
        assert_eq!(resp.cseq(), Some((1, SipMethod::Invite)));
        assert!(!resp.is_success());
    }

    #[test]
    fn test_name_addr_helpers() {
        let value = "\"Bob\" <sip:bob@example.com;transport=udp>;tag=abc;x=1";
        assert_eq!(header_param(value, "tag"), Some("abc".to_string()));
        assert_eq!(addr_spec(value), "sip:bob@example.com;transport=udp");
        assert_eq!(strip_params(value), "\"Bob\" <sip:bob@example.com;transport=udp>");

        assert_eq!(addr_spec("sip:carol@example.com;tag=1"), "sip:carol@example.com");
        assert_eq!(header_param("sip:carol@example.com;tag=1", "tag"), Some("1".to_string()));
    }

    #[test]
    fn test_sip_error_into_domain_error() {
        let err: DomainError = SipError::NoDialog("42".to_string()).into();
        assert!(matches!(err, DomainError::Transport(_)));
    }
}
