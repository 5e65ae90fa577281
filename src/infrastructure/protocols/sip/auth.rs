//! SIP Digest Authentication, client side (RFC 2617, RFC 3261 §22)

use super::message::{SipError, SipResponse};
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

/// Nonce count; a fresh challenge is answered once
const NONCE_COUNT: &str = "00000001";

/// Account credentials
#[derive(Debug, Clone)]
pub struct DigestCredentials {
    pub username: String,
    pub password: String,
}

/// Challenge from a 401 or 407
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    /// 407 from a proxy rather than 401 from the registrar
    pub proxy: bool,
}

impl DigestChallenge {
    /// Challenge carried by a 401/407 response
    pub fn from_response(response: &SipResponse) -> Result<Self, SipError> {
        let (header, proxy) = match response.status_code() {
            401 => ("WWW-Authenticate", false),
            407 => ("Proxy-Authenticate", true),
            code => {
                return Err(SipError::Authentication(format!(
                    "{} is not an authentication challenge",
                    code
                )))
            }
        };

        let value = response
            .header(header)
            .ok_or_else(|| SipError::Authentication(format!("Missing {} header", header)))?;

        Self::parse(&value, proxy)
    }

    pub fn parse(value: &str, proxy: bool) -> Result<Self, SipError> {
        let params = parse_digest_params(value);

        let required = |key: &str| {
            params
                .get(key)
                .cloned()
                .ok_or_else(|| SipError::Authentication(format!("Missing {} in challenge", key)))
        };

        if let Some(algorithm) = params.get("algorithm") {
            if !algorithm.eq_ignore_ascii_case("MD5") {
                return Err(SipError::Authentication(format!(
                    "Unsupported digest algorithm {}",
                    algorithm
                )));
            }
        }

        // Only qop=auth is supported; a list such as "auth,auth-int" is narrowed
        let qop = params.get("qop").and_then(|qop| {
            qop.split(',')
                .map(str::trim)
                .find(|q| q.eq_ignore_ascii_case("auth"))
                .map(|_| "auth".to_string())
        });

        Ok(Self {
            realm: required("realm")?,
            nonce: required("nonce")?,
            opaque: params.get("opaque").cloned(),
            algorithm: params.get("algorithm").cloned(),
            qop,
            proxy,
        })
    }

    /// Header the answer goes in
    pub fn authorization_header_name(&self) -> &'static str {
        if self.proxy {
            "Proxy-Authorization"
        } else {
            "Authorization"
        }
    }
}

/// Split `Digest k="v", k=v` into a map, keeping commas inside quotes
fn parse_digest_params(value: &str) -> HashMap<String, String> {
    let digest_str = value
        .trim()
        .strip_prefix("Digest")
        .unwrap_or(value)
        .trim();

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in digest_str.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .iter()
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| {
            (
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_string(),
            )
        })
        .collect()
}

/// Calculate the digest response
#[allow(clippy::too_many_arguments)]
pub fn calculate_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
    qop: Option<&str>,
    nc: &str,
    cnonce: &str,
) -> String {
    // HA1 = MD5(username:realm:password)
    let ha1 = format!(
        "{:x}",
        md5::compute(format!("{}:{}:{}", username, realm, password))
    );

    // HA2 = MD5(method:uri)
    let ha2 = format!("{:x}", md5::compute(format!("{}:{}", method, uri)));

    // Response = MD5(HA1:nonce:HA2) or MD5(HA1:nonce:nc:cnonce:qop:HA2)
    let digest = match qop {
        Some(qop) => md5::compute(format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, nonce, nc, cnonce, qop, ha2
        )),
        None => md5::compute(format!("{}:{}:{}", ha1, nonce, ha2)),
    };

    format!("{:x}", digest)
}

impl DigestCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the Authorization header answering `challenge`
    pub fn authorization(&self, challenge: &DigestChallenge, method: &str, uri: &str) -> String {
        let cnonce = {
            let mut rng = rand::thread_rng();
            let bytes: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
            hex::encode(bytes)
        };
        self.authorization_with_cnonce(challenge, method, uri, &cnonce)
    }

    pub fn authorization_with_cnonce(
        &self,
        challenge: &DigestChallenge,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        let response = calculate_response(
            &self.username,
            &self.password,
            &challenge.realm,
            &challenge.nonce,
            method,
            uri,
            challenge.qop.as_deref(),
            NONCE_COUNT,
            cnonce,
        );
        debug!("Answering digest challenge for realm {}", challenge.realm);

        let mut value = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm=MD5"#,
            self.username, challenge.realm, challenge.nonce, uri, response
        );
        if let Some(qop) = &challenge.qop {
            value.push_str(&format!(r#", qop={}, nc={}, cnonce="{}""#, qop, NONCE_COUNT, cnonce));
        }
        if let Some(opaque) = &challenge.opaque {
            value.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC2617_CHALLENGE: &str = r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    #[test]
    fn test_parse_challenge() {
        let challenge = DigestChallenge::parse(RFC2617_CHALLENGE, false).unwrap();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
        assert_eq!(
            challenge.opaque.as_deref(),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
        assert_eq!(challenge.authorization_header_name(), "Authorization");
    }

    #[test]
    fn test_rfc2617_response() {
        let response = calculate_response(
            "Mufasa",
            "Circle Of Life",
            "testrealm@host.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "GET",
            "/dir/index.html",
            Some("auth"),
            "00000001",
            "0a4f113b",
        );
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn test_authorization_header() {
        let challenge = DigestChallenge::parse(RFC2617_CHALLENGE, false).unwrap();
        let credentials = DigestCredentials::new("Mufasa", "Circle Of Life");

        let value =
            credentials.authorization_with_cnonce(&challenge, "GET", "/dir/index.html", "0a4f113b");
        assert!(value.starts_with(r#"Digest username="Mufasa""#));
        assert!(value.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(value.contains("nc=00000001"));
        assert!(value.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        let result = DigestChallenge::parse(
            r#"Digest realm="pbx", nonce="abc", algorithm=SHA-256"#,
            true,
        );
        assert!(matches!(result, Err(SipError::Authentication(_))));
    }
}
