//! HTTP/1.1 upgrade handshake for the WebSocket client role.
//!
//! Builds the `GET / HTTP/1.1` upgrade request and validates the server's
//! `101 Switching Protocols` response, including the `Sec-WebSocket-Accept`
//! check (SHA-1 of the client key plus the RFC 6455 GUID, base64-encoded).
//! Pure request/response byte handling; the session owns the socket I/O.

use crate::error::WsError;
use base64::prelude::*;
use rand::RngCore;
use sha1::{Digest, Sha1};

/// Fixed GUID appended to the client key when deriving the accept value,
/// per RFC 6455 Section 1.3.
const ACCEPT_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// One upgrade exchange: the generated key, the request bytes, and the
/// validation of the server's answer.
#[derive(Debug, Clone)]
pub struct Handshake {
    host: String,
    port: u16,
    key: String,
    expected_accept: String,
}

impl Handshake {
    /// Prepare a handshake for `host:port`, drawing the 16-byte nonce for
    /// `Sec-WebSocket-Key` from `rng`.
    pub fn new(host: &str, port: u16, rng: &mut dyn RngCore) -> Self {
        let mut nonce = [0u8; 16];
        rng.fill_bytes(&mut nonce);
        let key = BASE64_STANDARD.encode(nonce);
        let expected_accept = derive_accept_key(&key);

        Handshake {
            host: host.to_string(),
            port,
            key,
            expected_accept,
        }
    }

    /// The `Sec-WebSocket-Key` this handshake sends.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The `Sec-WebSocket-Accept` value a compliant server must answer with.
    pub fn expected_accept(&self) -> &str {
        &self.expected_accept
    }

    /// Serialize the upgrade request.
    pub fn request_bytes(&self) -> Vec<u8> {
        format!(
            "GET / HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            self.host, self.port, self.key
        )
        .into_bytes()
    }

    /// Validate the server's response bytes.
    ///
    /// Returns `Ok(None)` while the terminating blank line has not arrived
    /// yet. On success returns the offset of the first byte past the headers;
    /// anything the server sent after the handshake belongs to the framing
    /// layer and must not be discarded.
    pub fn validate(&self, response: &[u8]) -> Result<Option<usize>, WsError> {
        let Some(header_end) = find_header_end(response) else {
            return Ok(None);
        };
        let body_offset = header_end + 4;

        let head = std::str::from_utf8(&response[..header_end])
            .map_err(|_| WsError::HandshakeRejected("response is not valid UTF-8".into()))?;

        let mut lines = head.lines();
        let status_line = lines
            .next()
            .ok_or_else(|| WsError::HandshakeRejected("empty response".into()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        let status = parts.next().unwrap_or("");
        if !version.starts_with("HTTP/1.1") || status != "101" {
            return Err(WsError::HandshakeRejected(format!(
                "unexpected status line: {status_line}"
            )));
        }

        let mut upgrade_ok = false;
        let mut accept = None;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "upgrade" => upgrade_ok = value.eq_ignore_ascii_case("websocket"),
                "sec-websocket-accept" => accept = Some(value.to_string()),
                _ => {}
            }
        }

        if !upgrade_ok {
            return Err(WsError::HandshakeRejected(
                "missing or invalid Upgrade header".into(),
            ));
        }
        match accept {
            Some(value) if value == self.expected_accept => {}
            Some(_) => {
                return Err(WsError::HandshakeRejected(
                    "Sec-WebSocket-Accept does not match the sent key".into(),
                ));
            }
            None => {
                return Err(WsError::HandshakeRejected(
                    "missing Sec-WebSocket-Accept header".into(),
                ));
            }
        }

        Ok(Some(body_offset))
    }
}

/// Derive the `Sec-WebSocket-Accept` value for a client key.
pub fn derive_accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(ACCEPT_GUID);
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Locate the `\r\n\r\n` terminating the HTTP headers.
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn handshake() -> Handshake {
        Handshake::new("127.0.0.1", 8080, &mut StdRng::seed_from_u64(99))
    }

    fn response_for(hs: &Handshake) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            hs.expected_accept()
        )
    }

    #[test]
    fn accept_key_matches_rfc_vector() {
        // RFC 6455 Section 1.3 worked example.
        assert_eq!(
            derive_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn request_carries_required_headers() {
        let hs = handshake();
        let request = String::from_utf8(hs.request_bytes()).unwrap();

        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(request.contains("Host: 127.0.0.1:8080\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains(&format!("Sec-WebSocket-Key: {}\r\n", hs.key())));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn distinct_handshakes_use_distinct_keys() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Handshake::new("h", 80, &mut rng);
        let b = Handshake::new("h", 80, &mut rng);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn valid_response_accepted() {
        let hs = handshake();
        let response = response_for(&hs);
        let offset = hs.validate(response.as_bytes()).unwrap().unwrap();
        assert_eq!(offset, response.len());
    }

    #[test]
    fn leftover_bytes_after_headers_are_reported() {
        let hs = handshake();
        let mut response = response_for(&hs).into_bytes();
        let body_start = response.len();
        response.extend_from_slice(&[0x81, 0x02, b'h', b'i']);

        let offset = hs.validate(&response).unwrap().unwrap();
        assert_eq!(offset, body_start);
    }

    #[test]
    fn incomplete_headers_need_more_data() {
        let hs = handshake();
        let response = response_for(&hs);
        assert!(hs.validate(&response.as_bytes()[..20]).unwrap().is_none());
    }

    #[test]
    fn non_101_status_rejected() {
        let hs = handshake();
        let response = "HTTP/1.1 403 Forbidden\r\n\r\n";
        assert!(matches!(
            hs.validate(response.as_bytes()),
            Err(WsError::HandshakeRejected(_))
        ));
    }

    #[test]
    fn missing_upgrade_header_rejected() {
        let hs = handshake();
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            hs.expected_accept()
        );
        assert!(matches!(
            hs.validate(response.as_bytes()),
            Err(WsError::HandshakeRejected(_))
        ));
    }

    #[test]
    fn upgrade_header_is_case_insensitive() {
        let hs = handshake();
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             UPGRADE: WebSocket\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            hs.expected_accept()
        );
        assert!(hs.validate(response.as_bytes()).unwrap().is_some());
    }

    #[test]
    fn wrong_accept_value_rejected() {
        let hs = handshake();
        let response = "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBrZXk=\r\n\r\n";
        assert!(matches!(
            hs.validate(response.as_bytes()),
            Err(WsError::HandshakeRejected(_))
        ));
    }
}
