//! Network discovery and group-coordinator selection.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};
use xmltree::Element;

use crate::device::{self, Description, Device};
use crate::error::{ControlError, Result};
use crate::soap::SoapClient;
use crate::ssdp;

const ZONE_GROUP_ENDPOINT: &str = "ZoneGroupTopology/Control";
const ZONE_GROUP_SERVICE: &str = "urn:schemas-upnp-org:service:ZoneGroupTopology:1";

/// Find all Sonos players on the local network.
///
/// `timeout` bounds how long we wait for SSDP responses. Devices that answer
/// the search but fail description fetch or parsing are skipped with a log
/// line rather than failing the whole scan.
pub fn discover(timeout: Duration) -> Result<Vec<Device>> {
    let soap = SoapClient::new();
    let responses = ssdp::search(ssdp::ZONE_PLAYER_TARGET, timeout)?;
    debug!(count = responses.len(), "SSDP search finished");

    let mut seen = HashSet::new();
    let mut devices = Vec::new();
    for response in responses.iter().filter(|r| r.is_likely_sonos()) {
        let Some(ip) = device::host_from_url(&response.location) else {
            warn!(location = %response.location, "unparseable device location");
            continue;
        };
        if !seen.insert(ip.clone()) {
            continue;
        }

        let description = match soap
            .fetch(&response.location)
            .and_then(|xml| Description::from_xml(&xml))
        {
            Ok(description) => description,
            Err(e) => {
                warn!(%ip, error = %e, "skipping device with bad description");
                continue;
            }
        };
        if !description.is_sonos() {
            continue;
        }

        let device = description.into_device(ip);
        debug!(room = %device.room_name, ip = %device.ip, "found Sonos player");
        devices.push(device);
    }

    Ok(devices)
}

/// Pick the group coordinator among the discovered players.
///
/// Any player can report the zone topology; we ask the first one and match
/// its coordinator UUID against the discovered set. If the topology query
/// fails or names a player we did not discover, the first player stands in.
/// No players at all is fatal.
pub fn find_coordinator(timeout: Duration) -> Result<Device> {
    let devices = discover(timeout)?;
    let Some(first) = devices.first().cloned() else {
        return Err(ControlError::NoCoordinator);
    };

    let soap = SoapClient::new();
    match coordinator_uuid(&soap, &first) {
        Ok(uuid) => {
            if let Some(coordinator) = devices.iter().find(|d| d.udn.contains(&uuid)) {
                return Ok(coordinator.clone());
            }
            warn!(%uuid, "coordinator not among discovered players, using first");
            Ok(first)
        }
        Err(e) => {
            warn!(error = %e, "zone topology query failed, using first player");
            Ok(first)
        }
    }
}

/// Ask a player for the zone topology and return the first group's
/// coordinator UUID.
fn coordinator_uuid(soap: &SoapClient, device: &Device) -> Result<String> {
    let response = soap.action(
        &device.ip,
        device.port,
        ZONE_GROUP_ENDPOINT,
        ZONE_GROUP_SERVICE,
        "GetZoneGroupState",
        "",
    )?;

    let state = response
        .get_child("ZoneGroupState")
        .and_then(|e| e.get_text())
        .ok_or_else(|| ControlError::Parse("missing ZoneGroupState".to_string()))?;

    parse_coordinator(&state)
}

/// The zone group state arrives as escaped XML inside the SOAP response.
fn parse_coordinator(state_xml: &str) -> Result<String> {
    let root = Element::parse(state_xml.as_bytes())
        .map_err(|e| ControlError::Parse(format!("bad zone group state: {e}")))?;

    // Newer firmware nests groups under <ZoneGroups>; older puts them at
    // the root.
    let groups = root.get_child("ZoneGroups").unwrap_or(&root);
    groups
        .children
        .iter()
        .filter_map(|node| node.as_element())
        .find(|e| e.name == "ZoneGroup")
        .and_then(|group| group.attributes.get("Coordinator"))
        .cloned()
        .ok_or_else(|| ControlError::Parse("no ZoneGroup with a Coordinator".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_coordinator_from_nested_groups() {
        let xml = r#"<ZoneGroupState>
            <ZoneGroups>
                <ZoneGroup Coordinator="RINCON_000E58A0123456" ID="RINCON_000E58A0123456:1">
                    <ZoneGroupMember UUID="RINCON_000E58A0123456" ZoneName="Living Room"/>
                    <ZoneGroupMember UUID="RINCON_000E58B0654321" ZoneName="Kitchen"/>
                </ZoneGroup>
            </ZoneGroups>
        </ZoneGroupState>"#;
        assert_eq!(parse_coordinator(xml).unwrap(), "RINCON_000E58A0123456");
    }

    #[test]
    fn reads_coordinator_from_flat_groups() {
        let xml = r#"<ZoneGroups>
            <ZoneGroup Coordinator="RINCON_AA" ID="RINCON_AA:1"/>
        </ZoneGroups>"#;
        assert_eq!(parse_coordinator(xml).unwrap(), "RINCON_AA");
    }

    #[test]
    fn missing_coordinator_is_a_parse_error() {
        assert!(matches!(
            parse_coordinator("<ZoneGroups/>"),
            Err(ControlError::Parse(_))
        ));
        assert!(matches!(
            parse_coordinator("not xml"),
            Err(ControlError::Parse(_))
        ));
    }
}
