//! SSDP search for Sonos ZonePlayer devices.
//!
//! Sends an M-SEARCH multicast and collects unicast responses until the
//! socket read timeout elapses. Responses are filtered early so that only
//! likely Sonos devices reach the HTTP description fetch.

use std::net::UdpSocket;
use std::time::Duration;

use crate::error::{ControlError, Result};

const SSDP_MULTICAST: &str = "239.255.255.250:1900";
pub(crate) const ZONE_PLAYER_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";

/// One parsed M-SEARCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SsdpResponse {
    pub location: String,
    pub search_target: String,
    pub usn: String,
    pub server: Option<String>,
}

impl SsdpResponse {
    /// Cheap pre-filter before fetching the device description.
    pub fn is_likely_sonos(&self) -> bool {
        self.search_target.contains("ZonePlayer")
            || self.usn.contains("RINCON")
            || self
                .server
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains("sonos"))
    }
}

/// Multicast an M-SEARCH and gather responses until `timeout` of silence.
pub(crate) fn search(search_target: &str, timeout: Duration) -> Result<Vec<SsdpResponse>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| ControlError::Network(format!("failed to bind UDP socket: {e}")))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ControlError::Network(format!("failed to set read timeout: {e}")))?;

    let request = format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 2\r\n\
         ST: {search_target}\r\n\
         USER-AGENT: sonos-mpris/1.0 UPnP/1.0\r\n\
         \r\n"
    );
    socket
        .send_to(request.as_bytes(), SSDP_MULTICAST)
        .map_err(|e| ControlError::Network(format!("failed to send M-SEARCH: {e}")))?;

    let mut responses = Vec::new();
    let mut buffer = [0u8; 2048];
    loop {
        match socket.recv_from(&mut buffer) {
            Ok((size, _)) => {
                if let Ok(text) = std::str::from_utf8(&buffer[..size]) {
                    if let Some(response) = parse_response(text) {
                        responses.push(response);
                    }
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(e) => return Err(ControlError::Network(format!("socket error: {e}"))),
        }
    }
    Ok(responses)
}

/// Parse the HTTP-shaped SSDP response text.
fn parse_response(text: &str) -> Option<SsdpResponse> {
    let mut location = None;
    let mut search_target = None;
    let mut usn = None;
    let mut server = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = header_value(line, "ST:") {
            search_target = Some(value);
        } else if let Some(value) = header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = header_value(line, "SERVER:") {
            server = Some(value);
        }
    }

    Some(SsdpResponse {
        location: location?,
        search_target: search_target?,
        usn: usn?,
        server,
    })
}

/// Extract a header value, matching the name case-insensitively.
fn header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len() && line[..header.len()].eq_ignore_ascii_case(header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
        LOCATION: http://192.168.1.100:1400/xml/device_description.xml\r\n\
        ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
        USN: uuid:RINCON_000E58A0123456::urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
        SERVER: Linux/3.14.0 UPnP/1.0 Sonos/70.3-35220\r\n\
        \r\n";

    #[test]
    fn parses_complete_response() {
        let parsed = parse_response(RESPONSE).unwrap();
        assert_eq!(
            parsed.location,
            "http://192.168.1.100:1400/xml/device_description.xml"
        );
        assert_eq!(parsed.search_target, ZONE_PLAYER_TARGET);
        assert!(parsed.usn.starts_with("uuid:RINCON"));
        assert!(parsed.server.unwrap().contains("Sonos"));
    }

    #[test]
    fn header_match_is_case_insensitive() {
        let lowered = RESPONSE.to_lowercase();
        let parsed = parse_response(&lowered).unwrap();
        assert_eq!(
            parsed.location,
            "http://192.168.1.100:1400/xml/device_description.xml"
        );
    }

    #[test]
    fn server_header_is_optional() {
        let without_server = "HTTP/1.1 200 OK\r\n\
            LOCATION: http://192.168.1.101:1400/xml/device_description.xml\r\n\
            ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
            USN: uuid:RINCON_000E58A0654321::urn:x\r\n\r\n";
        let parsed = parse_response(without_server).unwrap();
        assert_eq!(parsed.server, None);
        assert!(parsed.is_likely_sonos());
    }

    #[test]
    fn incomplete_responses_are_dropped() {
        assert!(parse_response("HTTP/1.1 200 OK\r\nST: urn:x\r\nUSN: uuid:y\r\n").is_none());
        assert!(parse_response("").is_none());
        assert!(parse_response("not an ssdp response at all").is_none());
    }

    #[test]
    fn sonos_filter_checks_all_signals() {
        let base = SsdpResponse {
            location: "http://10.0.0.1:1400/desc.xml".into(),
            search_target: "urn:other".into(),
            usn: "uuid:OTHER".into(),
            server: None,
        };
        assert!(!base.is_likely_sonos());

        let by_target = SsdpResponse {
            search_target: ZONE_PLAYER_TARGET.into(),
            ..base.clone()
        };
        assert!(by_target.is_likely_sonos());

        let by_usn = SsdpResponse {
            usn: "uuid:RINCON_AA::urn:x".into(),
            ..base.clone()
        };
        assert!(by_usn.is_likely_sonos());

        let by_server = SsdpResponse {
            server: Some("Linux UPnP/1.0 Sonos/70".into()),
            ..base
        };
        assert!(by_server.is_likely_sonos());
    }
}
