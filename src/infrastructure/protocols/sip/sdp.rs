//! Simple SDP (Session Description Protocol) handling
//!
//! Audio only. We offer G.711 and RFC 4733 events, and answer with the
//! subset of an offer we understand.

use std::fmt;
use std::net::IpAddr;

/// Payload types we can negotiate, in preference order
const SUPPORTED: [(&str, &str); 3] = [
    ("0", "PCMU/8000"),
    ("8", "PCMA/8000"),
    ("101", "telephone-event/8000"),
];

/// Simple SDP session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpSession {
    pub version: u32,
    pub origin: SdpOrigin,
    pub session_name: String,
    pub connection: SdpConnection,
    pub media: Vec<SdpMedia>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpConnection {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpMedia {
    pub media_type: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    pub rtpmap: Vec<(String, String)>,
}

fn address_type(address: &str) -> &'static str {
    if address.contains(':') {
        "IP6"
    } else {
        "IP4"
    }
}

impl SdpSession {
    /// Our audio offer
    pub fn create_audio_session(local_ip: IpAddr, local_port: u16) -> Self {
        Self::with_formats(local_ip, local_port, SUPPORTED.to_vec())
    }

    /// Answer to a remote offer, `None` if no codec is shared
    pub fn answer(offer: &SdpSession, local_ip: IpAddr, local_port: u16) -> Option<Self> {
        let offered = offer.audio_media()?;

        let common: Vec<(&str, &str)> = SUPPORTED
            .iter()
            .copied()
            .filter(|(pt, _)| offered.formats.iter().any(|f| f == pt))
            .collect();

        // An answer with only telephone-event carries no audio
        if common.iter().all(|(pt, _)| *pt == "101") {
            return None;
        }

        Some(Self::with_formats(local_ip, local_port, common))
    }

    fn with_formats(local_ip: IpAddr, local_port: u16, formats: Vec<(&str, &str)>) -> Self {
        Self {
            version: 0,
            origin: SdpOrigin {
                username: "yakphone".to_string(),
                session_id: chrono::Utc::now().timestamp().to_string(),
                session_version: "1".to_string(),
                address: local_ip.to_string(),
            },
            session_name: "yakphone call".to_string(),
            connection: SdpConnection {
                address: local_ip.to_string(),
            },
            media: vec![SdpMedia {
                media_type: "audio".to_string(),
                port: local_port,
                protocol: "RTP/AVP".to_string(),
                formats: formats.iter().map(|(pt, _)| pt.to_string()).collect(),
                rtpmap: formats
                    .iter()
                    .map(|(pt, encoding)| (pt.to_string(), encoding.to_string()))
                    .collect(),
            }],
        }
    }

    /// Parse SDP from string
    pub fn parse(sdp_body: &str) -> Option<Self> {
        let mut version = 0;
        let mut origin: Option<SdpOrigin> = None;
        let mut session_name = String::new();
        let mut connection: Option<SdpConnection> = None;
        let mut media: Vec<SdpMedia> = Vec::new();

        for line in sdp_body.lines().map(str::trim) {
            // <type>=<value> with a one-letter type; anything else is skipped
            let Some((field_type, value)) = line.split_once('=') else {
                continue;
            };
            if field_type.len() != 1 || !field_type.is_ascii() {
                continue;
            }
            let value = value.trim();

            match field_type {
                "v" => version = value.parse().unwrap_or(0),
                "o" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 6 {
                        origin = Some(SdpOrigin {
                            username: parts[0].to_string(),
                            session_id: parts[1].to_string(),
                            session_version: parts[2].to_string(),
                            address: parts[5].to_string(),
                        });
                    }
                }
                "s" => session_name = value.to_string(),
                "c" => {
                    // Media-level connections are ignored
                    if media.is_empty() {
                        if let Some(address) = value.split_whitespace().nth(2) {
                            connection = Some(SdpConnection {
                                address: address.to_string(),
                            });
                        }
                    }
                }
                "m" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 4 {
                        media.push(SdpMedia {
                            media_type: parts[0].to_string(),
                            port: parts[1].parse().unwrap_or(0),
                            protocol: parts[2].to_string(),
                            formats: parts[3..].iter().map(|s| s.to_string()).collect(),
                            rtpmap: Vec::new(),
                        });
                    }
                }
                "a" => {
                    if let (Some(current), Some(rtpmap)) =
                        (media.last_mut(), value.strip_prefix("rtpmap:"))
                    {
                        if let Some((pt, encoding)) = rtpmap.split_once(' ') {
                            current.rtpmap.push((pt.to_string(), encoding.to_string()));
                        }
                    }
                }
                _ => {}
            }
        }

        Some(Self {
            version,
            origin: origin?,
            session_name,
            connection: connection?,
            media,
        })
    }

    pub fn audio_media(&self) -> Option<&SdpMedia> {
        self.media.iter().find(|m| m.media_type == "audio")
    }

    /// Audio payload types, in the order listed
    pub fn audio_codecs(&self) -> Vec<u8> {
        self.audio_media()
            .map(|audio| {
                audio
                    .formats
                    .iter()
                    .filter_map(|f| f.parse::<u8>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for SdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}\r\n", self.version)?;
        write!(
            f,
            "o={} {} {} IN {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            address_type(&self.origin.address),
            self.origin.address
        )?;
        write!(f, "s={}\r\n", self.session_name)?;
        write!(
            f,
            "c=IN {} {}\r\n",
            address_type(&self.connection.address),
            self.connection.address
        )?;
        write!(f, "t=0 0\r\n")?;

        for media in &self.media {
            write!(
                f,
                "m={} {} {} {}\r\n",
                media.media_type,
                media.port,
                media.protocol,
                media.formats.join(" ")
            )?;
            for (pt, encoding) in &media.rtpmap {
                write!(f, "a=rtpmap:{} {}\r\n", pt, encoding)?;
            }
            if media.rtpmap.iter().any(|(_, e)| e.starts_with("telephone-event")) {
                write!(f, "a=fmtp:101 0-16\r\n")?;
            }
            write!(f, "a=sendrecv\r\n")?;
        }

        Ok(())
    }
}
