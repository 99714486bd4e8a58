//! Minimal SOAP/GENA HTTP client for UPnP device communication.
//!
//! Sonos devices expose control actions over SOAP POST requests and event
//! subscriptions over the GENA `SUBSCRIBE`/`UNSUBSCRIBE` methods. Both share
//! one `ureq` agent with bounded connect/read timeouts, so no call (including
//! the synchronous position query the protocol host makes) can stall
//! indefinitely.

use std::time::Duration;

use xmltree::Element;

use crate::error::{ControlError, Result};

/// Grant returned by the device for a GENA subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionGrant {
    /// Subscription ID (SID header)
    pub sid: String,
    /// Lease duration actually granted by the device, in seconds
    pub timeout_seconds: u32,
}

/// SOAP client bound to nothing; device address is passed per call.
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(2))
                .timeout_read(Duration::from_secs(5))
                .build(),
        }
    }

    /// Invoke a SOAP action and return the `<ActionResponse>` element.
    pub fn action(
        &self,
        ip: &str,
        port: u16,
        endpoint: &str,
        service_uri: &str,
        action: &str,
        payload: &str,
    ) -> Result<Element> {
        let envelope = format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_uri}">{payload}</u:{action}></s:Body></s:Envelope>"#
        );

        let url = format!("http://{ip}:{port}/{endpoint}");
        let soap_action = format!("\"{service_uri}#{action}\"");

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .send_string(&envelope)
            .map_err(|e| ControlError::Network(e.to_string()))?;

        let body = response
            .into_string()
            .map_err(|e| ControlError::Network(e.to_string()))?;

        let xml =
            Element::parse(body.as_bytes()).map_err(|e| ControlError::Parse(e.to_string()))?;

        extract_action_response(&xml, action)
    }

    /// Open a GENA subscription against an event endpoint.
    pub fn subscribe(
        &self,
        ip: &str,
        port: u16,
        event_endpoint: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionGrant> {
        let response = self
            .agent
            .request("SUBSCRIBE", &format!("http://{ip}:{port}/{event_endpoint}"))
            .set("HOST", &format!("{ip}:{port}"))
            .set("CALLBACK", &format!("<{callback_url}>"))
            .set("NT", "upnp:event")
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call()
            .map_err(|e| ControlError::Subscription(e.to_string()))?;

        if response.status() != 200 {
            return Err(ControlError::Subscription(format!(
                "SUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }

        let sid = response
            .header("SID")
            .ok_or_else(|| {
                ControlError::Subscription("missing SID header in SUBSCRIBE response".to_string())
            })?
            .to_string();

        let granted = response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds);

        Ok(SubscriptionGrant {
            sid,
            timeout_seconds: granted,
        })
    }

    /// Renew an existing GENA subscription, returning the new lease duration.
    pub fn renew(
        &self,
        ip: &str,
        port: u16,
        event_endpoint: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<u32> {
        let response = self
            .agent
            .request("SUBSCRIBE", &format!("http://{ip}:{port}/{event_endpoint}"))
            .set("HOST", &format!("{ip}:{port}"))
            .set("SID", sid)
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call()
            .map_err(|e| ControlError::Subscription(e.to_string()))?;

        if response.status() != 200 {
            return Err(ControlError::Subscription(format!(
                "renewal failed: HTTP {}",
                response.status()
            )));
        }

        Ok(response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds))
    }

    /// Cancel a GENA subscription.
    pub fn unsubscribe(&self, ip: &str, port: u16, event_endpoint: &str, sid: &str) -> Result<()> {
        let response = self
            .agent
            .request(
                "UNSUBSCRIBE",
                &format!("http://{ip}:{port}/{event_endpoint}"),
            )
            .set("HOST", &format!("{ip}:{port}"))
            .set("SID", sid)
            .call()
            .map_err(|e| ControlError::Subscription(e.to_string()))?;

        if response.status() != 200 {
            return Err(ControlError::Subscription(format!(
                "UNSUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Fetch a URL as text. Used for device-description documents.
    pub fn fetch(&self, url: &str) -> Result<String> {
        self.agent
            .get(url)
            .call()
            .map_err(|e| ControlError::Network(e.to_string()))?
            .into_string()
            .map_err(|e| ControlError::Network(e.to_string()))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a GENA `TIMEOUT: Second-N` header value.
fn parse_timeout_header(value: &str) -> Option<u32> {
    value.strip_prefix("Second-")?.parse().ok()
}

/// Pull `<{action}Response>` out of a SOAP envelope, or surface the fault.
fn extract_action_response(envelope: &Element, action: &str) -> Result<Element> {
    let body = envelope
        .get_child("Body")
        .ok_or_else(|| ControlError::Parse("missing SOAP Body".to_string()))?;

    if let Some(fault) = body.get_child("Fault") {
        let code = fault
            .get_child("detail")
            .and_then(|d| d.get_child("UpnPError"))
            .and_then(|e| e.get_child("errorCode"))
            .and_then(|c| c.get_text())
            .and_then(|t| t.parse().ok())
            .unwrap_or(500);
        return Err(ControlError::Fault(code));
    }

    let wanted = format!("{action}Response");
    body.get_child(wanted.as_str())
        .cloned()
        .ok_or_else(|| ControlError::Parse(format!("missing {wanted} element")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_action_response() {
        let xml = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:PauseResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"/>
                </s:Body>
            </s:Envelope>"#;
        let envelope = Element::parse(xml.as_bytes()).unwrap();

        let response = extract_action_response(&envelope, "Pause").unwrap();
        assert_eq!(response.name, "PauseResponse");
    }

    #[test]
    fn surfaces_upnp_fault_code() {
        let xml = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UpnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>701</errorCode>
                            </UpnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>"#;
        let envelope = Element::parse(xml.as_bytes()).unwrap();

        match extract_action_response(&envelope, "Play") {
            Err(ControlError::Fault(code)) => assert_eq!(code, 701),
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn fault_without_detail_defaults_to_500() {
        let xml = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Server</faultcode>
                    </s:Fault>
                </s:Body>
            </s:Envelope>"#;
        let envelope = Element::parse(xml.as_bytes()).unwrap();

        match extract_action_response(&envelope, "Play") {
            Err(ControlError::Fault(code)) => assert_eq!(code, 500),
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn missing_body_and_missing_response_are_parse_errors() {
        let no_body = Element::parse(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#.as_bytes(),
        )
        .unwrap();
        assert!(matches!(
            extract_action_response(&no_body, "Play"),
            Err(ControlError::Parse(_))
        ));

        let empty_body = Element::parse(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body/></s:Envelope>"#
                .as_bytes(),
        )
        .unwrap();
        assert!(matches!(
            extract_action_response(&empty_body, "Play"),
            Err(ControlError::Parse(_))
        ));
    }

    #[test]
    fn parses_timeout_header() {
        assert_eq!(parse_timeout_header("Second-1800"), Some(1800));
        assert_eq!(parse_timeout_header("Second-0"), Some(0));
        assert_eq!(parse_timeout_header("infinite"), None);
    }
}
