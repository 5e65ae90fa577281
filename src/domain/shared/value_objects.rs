//! Shared value objects used across the softphone

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transport session identifier
///
/// Minted by the controller for every outgoing attempt and by the transport
/// for every inbound invite. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phonecall record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhonecallId(Uuid);

impl PhonecallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PhonecallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhonecallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contact (partner) identifier as known by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(i64);

impl PartnerId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A dialable phone number
///
/// Visual separators (spaces, dashes, slashes, dots, parentheses, soft
/// hyphens) are stripped. What remains must be an optional leading `+`
/// followed by digits, `*` or `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let cleaned: String = raw
            .chars()
            .filter(|c| {
                !c.is_whitespace() && !matches!(c, '-' | '/' | '.' | '(' | ')' | '\u{00AD}')
            })
            .collect();

        let dialable = cleaned.strip_prefix('+').unwrap_or(&cleaned);
        if dialable.is_empty() {
            return Err(format!("Invalid phone number: \"{}\"", raw));
        }
        if !dialable
            .chars()
            .all(|c| c.is_ascii_digit() || c == '*' || c == '#')
        {
            return Err(format!("Invalid phone number: \"{}\"", raw));
        }

        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SIP URI value object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SipUri {
    user: String,
    host: String,
    port: Option<u16>,
}

impl SipUri {
    pub fn new(user: String, host: String, port: Option<u16>) -> Self {
        Self { user, host, port }
    }

    /// Parse a URI as found in request lines and name-addr headers.
    ///
    /// Accepts `sip:user@host[:port]`, optionally wrapped in angle brackets
    /// with a display name, and ignores URI and header parameters.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let uri = match (uri.find('<'), uri.find('>')) {
            (Some(start), Some(end)) if start < end => &uri[start + 1..end],
            _ => uri.trim(),
        };

        let uri = uri
            .strip_prefix("sip:")
            .or_else(|| uri.strip_prefix("sips:"))
            .ok_or_else(|| "URI must start with 'sip:'".to_string())?;

        let uri = uri.split(';').next().unwrap_or_default();
        let (user, host_port) = uri
            .split_once('@')
            .ok_or_else(|| "Invalid SIP URI format".to_string())?;

        if user.is_empty() {
            return Err("Invalid SIP URI format".to_string());
        }

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (host, port.parse().ok()),
            None => (host_port, None),
        };

        if host.is_empty() {
            return Err("Invalid SIP URI format".to_string());
        }

        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(port) = self.port {
            write!(f, "sip:{}@{}:{}", self.user, self.host, port)
        } else {
            write!(f, "sip:{}@{}", self.user, self.host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sip_uri_parse() {
        let uri = SipUri::parse("sip:alice@example.com").unwrap();
        assert_eq!(uri.user(), "alice");
        assert_eq!(uri.host(), "example.com");
        assert_eq!(uri.port(), None);

        let uri_with_port = SipUri::parse("sip:bob@example.com:5060").unwrap();
        assert_eq!(uri_with_port.user(), "bob");
        assert_eq!(uri_with_port.host(), "example.com");
        assert_eq!(uri_with_port.port(), Some(5060));
    }

    #[test]
    fn test_sip_uri_parse_name_addr() {
        let uri = SipUri::parse("\"Bob\" <sip:+3225551234@pbx.example.com;user=phone>;tag=a6c85cf")
            .unwrap();
        assert_eq!(uri.user(), "+3225551234");
        assert_eq!(uri.host(), "pbx.example.com");

        assert!(SipUri::parse("mailto:bob@example.com").is_err());
        assert!(SipUri::parse("sip:example.com").is_err());
    }

    #[test]
    fn test_sip_uri_display() {
        let uri = SipUri::new("alice".to_string(), "example.com".to_string(), None);
        assert_eq!(uri.to_string(), "sip:alice@example.com");

        let uri_with_port = SipUri::new("bob".to_string(), "example.com".to_string(), Some(5060));
        assert_eq!(uri_with_port.to_string(), "sip:bob@example.com:5060");
    }

    #[test]
    fn test_phone_number_cleaning() {
        let number = PhoneNumber::parse("+32 (2) 555-12.34").unwrap();
        assert_eq!(number.as_str(), "+3225551234");

        assert_eq!(PhoneNumber::parse("*72#").unwrap().as_str(), "*72#");
    }

    #[test]
    fn test_phone_number_rejects_garbage() {
        assert!(PhoneNumber::parse("").is_err());
        assert!(PhoneNumber::parse(" - ").is_err());
        assert!(PhoneNumber::parse("+").is_err());
        assert!(PhoneNumber::parse("call me").is_err());
        assert!(PhoneNumber::parse("12+34").is_err());
    }
}
