//! SIP message builder utilities
//!
//! Messages are rendered as text and only ever parsed with rsip.

use super::message::{SipMethod, SipRequest};
use rand::Rng;

/// Product token sent in `User-Agent`
pub const USER_AGENT: &str = concat!("yakphone/", env!("CARGO_PKG_VERSION"));

/// Methods we answer, for `Allow`
pub const ALLOW: &str = "INVITE, ACK, CANCEL, BYE, OPTIONS, INFO, NOTIFY, REFER";

/// RFC 3261 magic cookie prefixed to every branch we generate
const BRANCH_COOKIE: &str = "z9hG4bK";

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

pub fn new_branch() -> String {
    format!("{}{}", BRANCH_COOKIE, random_token(8))
}

pub fn new_tag() -> String {
    random_token(6)
}

pub fn new_call_id(host: &str) -> String {
    format!("{}@{}", uuid::Uuid::new_v4().simple(), host)
}

pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Trying",
        180 => "Ringing",
        183 => "Session Progress",
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        407 => "Proxy Authentication Required",
        481 => "Call/Transaction Does Not Exist",
        486 => "Busy Here",
        487 => "Request Terminated",
        488 => "Not Acceptable Here",
        500 => "Server Internal Error",
        501 => "Not Implemented",
        603 => "Decline",
        _ => "Unknown",
    }
}

/// Build a SIP request
pub struct RequestBuilder {
    method: SipMethod,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<(String, String)>,
}

impl RequestBuilder {
    pub fn new(method: SipMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.body = Some((content_type.to_string(), body.into()));
        self
    }

    pub fn build(self) -> String {
        let mut message = format!("{} {} SIP/2.0\r\n", self.method, self.uri);
        for (name, value) in &self.headers {
            message.push_str(&format!("{}: {}\r\n", name, value));
        }
        message.push_str("Max-Forwards: 70\r\n");
        message.push_str(&format!("User-Agent: {}\r\n", USER_AGENT));
        finish(message, self.body)
    }
}

/// Build a SIP response to a received request
pub struct ResponseBuilder {
    status_code: u16,
    to_tag: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<(String, String)>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            to_tag: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Tag to add to `To` when the request did not carry one
    pub fn to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.body = Some((content_type.to_string(), body.into()));
        self
    }

    pub fn build_for_request(self, request: &SipRequest) -> String {
        let mut message = format!(
            "SIP/2.0 {} {}\r\n",
            self.status_code,
            reason_phrase(self.status_code)
        );

        for via in super::message::header_values(request.headers(), "Via") {
            message.push_str(&format!("Via: {}\r\n", via));
        }
        if let Some(from) = request.header("From") {
            message.push_str(&format!("From: {}\r\n", from));
        }
        if let Some(to) = request.header("To") {
            match (&self.to_tag, request.to_tag()) {
                (Some(tag), None) => message.push_str(&format!("To: {};tag={}\r\n", to, tag)),
                _ => message.push_str(&format!("To: {}\r\n", to)),
            }
        }
        if let Some(call_id) = request.call_id() {
            message.push_str(&format!("Call-ID: {}\r\n", call_id));
        }
        if let Some(cseq) = request.header("CSeq") {
            message.push_str(&format!("CSeq: {}\r\n", cseq));
        }

        for (name, value) in &self.headers {
            message.push_str(&format!("{}: {}\r\n", name, value));
        }
        message.push_str(&format!("User-Agent: {}\r\n", USER_AGENT));
        finish(message, self.body)
    }
}

fn finish(mut message: String, body: Option<(String, String)>) -> String {
    match body {
        Some((content_type, body)) => {
            message.push_str(&format!("Content-Type: {}\r\n", content_type));
            message.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            message.push_str(&body);
        }
        None => message.push_str("Content-Length: 0\r\n\r\n"),
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::message::SipMessage;

    fn invite() -> SipRequest {
        let text = RequestBuilder::new(SipMethod::Invite, "sip:alice@example.com")
            .header("Via", "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKabc")
            .header("From", "<sip:999@example.com>;tag=111")
            .header("To", "<sip:alice@example.com>")
            .header("Call-ID", "call-1@10.0.0.1")
            .header("CSeq", "1 INVITE")
            .build();

        SipRequest::parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_request_round_trip_through_rsip() {
        let request = invite();
        assert_eq!(request.method(), Some(SipMethod::Invite));
        assert_eq!(request.call_id(), Some("call-1@10.0.0.1".to_string()));
        assert_eq!(request.header("Max-Forwards"), Some("70".to_string()));
    }

    #[test]
    fn test_response_copies_dialog_headers_and_adds_tag() {
        let request = invite();
        let text = ResponseBuilder::new(180).to_tag("xyz").build_for_request(&request);

        let message = SipMessage::parse(text.as_bytes()).unwrap();
        let response = message.as_response().unwrap();
        assert_eq!(response.status_code(), 180);
        assert_eq!(response.reason(), "Ringing");
        assert_eq!(response.to_tag(), Some("xyz".to_string()));
        assert_eq!(response.call_id(), Some("call-1@10.0.0.1".to_string()));
        assert_eq!(response.cseq(), Some((1, SipMethod::Invite)));
    }

    #[test]
    fn test_body_sets_content_length() {
        let text = RequestBuilder::new(SipMethod::Info, "sip:alice@example.com")
            .body("application/dtmf-relay", "Signal=5\r\nDuration=160\r\n")
            .build();

        assert!(text.contains("Content-Length: 24\r\n\r\nSignal=5"));
    }

    #[test]
    fn test_branches_are_unique() {
        let branch = new_branch();
        assert!(branch.starts_with("z9hG4bK"));
        assert_ne!(branch, new_branch());
    }
}
