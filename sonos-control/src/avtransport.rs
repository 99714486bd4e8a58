//! AVTransport SOAP actions against a single device.

use xmltree::Element;

use crate::device::Device;
use crate::error::{ControlError, Result};
use crate::soap::SoapClient;

const CONTROL_ENDPOINT: &str = "MediaRenderer/AVTransport/Control";
pub(crate) const EVENT_ENDPOINT: &str = "MediaRenderer/AVTransport/Event";
const SERVICE_URI: &str = "urn:schemas-upnp-org:service:AVTransport:1";

/// Position report from `GetPositionInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionInfo {
    /// Elapsed time within the current track, `H:MM:SS`
    pub rel_time: String,
    /// Total duration of the current track, `H:MM:SS`
    pub track_duration: String,
}

/// Transport control surface for one device.
///
/// Every method maps to a single SOAP action on the device's AVTransport
/// service, always against instance 0 (the only instance Sonos exposes).
#[derive(Debug, Clone)]
pub struct AvTransport {
    soap: SoapClient,
    ip: String,
    port: u16,
}

impl AvTransport {
    pub fn new(device: &Device) -> Self {
        Self {
            soap: SoapClient::new(),
            ip: device.ip.clone(),
            port: device.port,
        }
    }

    pub fn play(&self) -> Result<()> {
        self.action("Play", "<InstanceID>0</InstanceID><Speed>1</Speed>")
            .map(|_| ())
    }

    pub fn pause(&self) -> Result<()> {
        self.action("Pause", "<InstanceID>0</InstanceID>").map(|_| ())
    }

    pub fn next(&self) -> Result<()> {
        self.action("Next", "<InstanceID>0</InstanceID>").map(|_| ())
    }

    pub fn previous(&self) -> Result<()> {
        self.action("Previous", "<InstanceID>0</InstanceID>")
            .map(|_| ())
    }

    /// Query elapsed position within the current track.
    pub fn position_info(&self) -> Result<PositionInfo> {
        let response = self.action("GetPositionInfo", "<InstanceID>0</InstanceID>")?;
        Ok(PositionInfo {
            rel_time: child_text(&response, "RelTime")?,
            track_duration: child_text(&response, "TrackDuration")?,
        })
    }

    fn action(&self, name: &str, payload: &str) -> Result<Element> {
        self.soap
            .action(&self.ip, self.port, CONTROL_ENDPOINT, SERVICE_URI, name, payload)
    }
}

fn child_text(element: &Element, name: &str) -> Result<String> {
    element
        .get_child(name)
        .map(|c| c.get_text().map(|t| t.into_owned()).unwrap_or_default())
        .ok_or_else(|| ControlError::Parse(format!("missing {name} in response")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_position_fields() {
        let xml = r#"<u:GetPositionInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
            <Track>7</Track>
            <TrackDuration>0:03:45</TrackDuration>
            <RelTime>0:01:30</RelTime>
            <AbsTime>NOT_IMPLEMENTED</AbsTime>
        </u:GetPositionInfoResponse>"#;
        let element = Element::parse(xml.as_bytes()).unwrap();

        assert_eq!(child_text(&element, "RelTime").unwrap(), "0:01:30");
        assert_eq!(child_text(&element, "TrackDuration").unwrap(), "0:03:45");
    }

    #[test]
    fn empty_child_yields_empty_string() {
        let xml = "<r><RelTime/></r>";
        let element = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(child_text(&element, "RelTime").unwrap(), "");
    }

    #[test]
    fn missing_child_is_a_parse_error() {
        let element = Element::parse("<r/>".as_bytes()).unwrap();
        assert!(matches!(
            child_text(&element, "RelTime"),
            Err(ControlError::Parse(_))
        ));
    }
}
