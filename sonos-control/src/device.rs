//! Device description parsing and the public `Device` type.

use serde::Deserialize;

use crate::error::{ControlError, Result};

/// A Sonos player found on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// UPnP unique device name, e.g. `uuid:RINCON_000E58A0123456`
    pub udn: String,
    /// Friendly name from the device description
    pub name: String,
    /// Room the speaker is assigned to
    pub room_name: String,
    /// IPv4 address on the local network
    pub ip: String,
    /// HTTP control port, 1400 on every Sonos model
    pub port: u16,
    pub model_name: String,
}

impl Device {
    /// Base URL for resolving relative resource paths (album art).
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Deserialize)]
struct Root {
    device: Description,
}

/// UPnP device description, as served at the SSDP LOCATION URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Description {
    device_type: String,
    friendly_name: String,
    manufacturer: String,
    model_name: String,
    #[serde(rename = "UDN")]
    udn: String,
    room_name: Option<String>,
}

impl Description {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root: Root = quick_xml::de::from_str(xml)
            .map_err(|e| ControlError::Parse(format!("bad device description: {e}")))?;
        Ok(root.device)
    }

    pub fn is_sonos(&self) -> bool {
        self.manufacturer.to_lowercase().contains("sonos")
            || self.device_type.contains("ZonePlayer")
    }

    pub fn into_device(self, ip: String) -> Device {
        Device {
            udn: self.udn,
            name: self.friendly_name,
            room_name: self.room_name.unwrap_or_else(|| "Unknown".to_string()),
            ip,
            port: 1400,
            model_name: self.model_name,
        }
    }
}

/// Pull the host address out of a description URL.
pub(crate) fn host_from_url(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split([':', '/'])
        .next()
        .map(|s| s.to_string())
}
