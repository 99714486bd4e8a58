//! AVTransport NOTIFY event parsing.
//!
//! Events arrive as a GENA propertyset whose `LastChange` element carries
//! XML-escaped event XML, which in turn carries doubly-escaped DIDL-Lite
//! track metadata. Each layer is unescaped by quick-xml as it parses the
//! layer above, so the decode is three sequential serde passes.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ControlError, Result};
use crate::track::{Track, TransportSnapshot, TransportState};

#[derive(Debug, Deserialize)]
#[serde(rename = "propertyset")]
struct PropertySet {
    property: Property,
}

#[derive(Debug, Deserialize)]
struct Property {
    #[serde(rename = "LastChange")]
    last_change: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Event")]
struct LastChange {
    #[serde(rename = "InstanceID")]
    instance: Instance,
}

#[derive(Debug, Deserialize)]
struct Instance {
    #[serde(rename = "TransportState")]
    transport_state: ValueAttr,
    #[serde(rename = "CurrentTrackDuration", default)]
    track_duration: Option<ValueAttr>,
    #[serde(rename = "CurrentTrackMetaData", default)]
    track_metadata: Option<ValueAttr>,
}

/// Empty element carrying its payload in a `val` attribute.
#[derive(Debug, Deserialize, Default)]
struct ValueAttr {
    #[serde(rename = "@val", default)]
    val: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "DIDL-Lite")]
struct DidlLite {
    item: DidlItem,
}

#[derive(Debug, Deserialize)]
struct DidlItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    creator: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(rename = "albumArtURI", default)]
    album_art_uri: Option<String>,
    #[serde(default)]
    res: Option<DidlResource>,
}

#[derive(Debug, Deserialize, Default)]
struct DidlResource {
    #[serde(rename = "@duration", default)]
    duration: Option<String>,
}

/// Parse a raw NOTIFY body into a transport snapshot.
///
/// The transport state is required; everything else degrades gracefully. In
/// particular a missing or unparseable DIDL payload yields a snapshot with
/// no track, which is exactly what the device sends between tracks.
pub fn parse_event(xml: &str) -> Result<TransportSnapshot> {
    let propertyset: PropertySet = decode(xml)?;
    let last_change: LastChange = decode(&propertyset.property.last_change)?;
    let instance = last_change.instance;

    let transport_state = TransportState::parse(&instance.transport_state.val);

    let didl = instance
        .track_metadata
        .as_ref()
        .filter(|m| !m.val.is_empty())
        .and_then(|m| match decode::<DidlLite>(&m.val) {
            Ok(didl) => Some(didl),
            Err(e) => {
                debug!(error = %e, "unparseable track metadata, treating as no track");
                None
            }
        });

    let track = didl.map(|didl| {
        // Prefer the duration on the DIDL resource; some sources omit it
        // there but still fill CurrentTrackDuration.
        let duration = didl
            .item
            .res
            .and_then(|r| r.duration)
            .or_else(|| instance.track_duration.as_ref().map(|d| d.val.clone()))
            .unwrap_or_default();

        Track {
            title: didl.item.title.unwrap_or_default(),
            artist: didl.item.creator.unwrap_or_default(),
            album: didl.item.album.unwrap_or_default(),
            album_art_uri: didl.item.album_art_uri.unwrap_or_default(),
            duration,
        }
    });

    Ok(TransportSnapshot {
        transport_state,
        track,
    })
}

fn decode<T: DeserializeOwned>(xml: &str) -> Result<T> {
    // quick-xml's serde layer has no namespace support, so element-name
    // prefixes (e:, dc:, upnp:) are stripped before parsing.
    let stripped = strip_tag_prefixes(xml);
    quick_xml::de::from_str(&stripped).map_err(|e| ControlError::Parse(e.to_string()))
}

/// Remove namespace prefixes from element names.
///
/// Only tag names are touched; attributes, attribute values, and text
/// content pass through untouched (track URIs legitimately contain colons).
fn strip_tag_prefixes(xml: &str) -> String {
    let mut result = String::with_capacity(xml.len());
    let mut chars = xml.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            result.push(c);
            continue;
        }
        result.push('<');
        if chars.peek() == Some(&'/') {
            result.push('/');
            chars.next();
        }
        if matches!(chars.peek(), Some('?') | Some('!')) {
            continue;
        }

        let mut name = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || ch == '>' || ch == '/' {
                break;
            }
            name.push(ch);
            chars.next();
        }
        match name.rsplit_once(':') {
            Some((_, local)) => result.push_str(local),
            None => result.push_str(&name),
        }

        // Copy the rest of the tag verbatim, honoring quoted values.
        let mut quote: Option<char> = None;
        while let Some(&ch) = chars.peek() {
            result.push(ch);
            chars.next();
            match quote {
                Some(q) if ch == q => quote = None,
                None if ch == '"' || ch == '\'' => quote = Some(ch),
                None if ch == '>' => break,
                _ => {}
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_EVENT: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;CurrentTrackURI val=&quot;x-sonos-spotify:spotify:track:123&quot;/&gt;&lt;CurrentTrackDuration val=&quot;0:03:45&quot;/&gt;&lt;CurrentTrackMetaData val=&quot;&amp;lt;DIDL-Lite xmlns:dc=&amp;quot;http://purl.org/dc/elements/1.1/&amp;quot; xmlns:upnp=&amp;quot;urn:schemas-upnp-org:metadata-1-0/upnp/&amp;quot;&amp;gt;&amp;lt;item id=&amp;quot;-1&amp;quot; parentID=&amp;quot;-1&amp;quot;&amp;gt;&amp;lt;res duration=&amp;quot;0:03:45&amp;quot;&amp;gt;x-sonos-spotify:spotify:track:123&amp;lt;/res&amp;gt;&amp;lt;dc:title&amp;gt;Test Song&amp;lt;/dc:title&amp;gt;&amp;lt;dc:creator&amp;gt;Test Artist&amp;lt;/dc:creator&amp;gt;&amp;lt;upnp:album&amp;gt;Test Album&amp;lt;/upnp:album&amp;gt;&amp;lt;upnp:albumArtURI&amp;gt;/getaa?s=1&amp;amp;amp;u=x&amp;lt;/upnp:albumArtURI&amp;gt;&amp;lt;/item&amp;gt;&amp;lt;/DIDL-Lite&amp;gt;&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;

    const NO_TRACK_EVENT: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;STOPPED&quot;/&gt;&lt;CurrentTrackMetaData val=&quot;&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;

    #[test]
    fn parses_full_playing_event() {
        let snapshot = parse_event(FULL_EVENT).unwrap();
        assert_eq!(snapshot.transport_state, TransportState::Playing);

        let track = snapshot.track.unwrap();
        assert_eq!(track.title, "Test Song");
        assert_eq!(track.artist, "Test Artist");
        assert_eq!(track.album, "Test Album");
        assert_eq!(track.album_art_uri, "/getaa?s=1&u=x");
        assert_eq!(track.duration, "0:03:45");
    }

    #[test]
    fn empty_metadata_means_no_track() {
        let snapshot = parse_event(NO_TRACK_EVENT).unwrap();
        assert_eq!(snapshot.transport_state, TransportState::Stopped);
        assert!(snapshot.track.is_none());
    }

    #[test]
    fn garbage_input_is_a_parse_error() {
        assert!(matches!(
            parse_event("not xml at all"),
            Err(ControlError::Parse(_))
        ));
        assert!(matches!(
            parse_event("<e:propertyset/>"),
            Err(ControlError::Parse(_))
        ));
    }

    #[test]
    fn unparseable_didl_degrades_to_no_track() {
        // CurrentTrackMetaData holds text that is not DIDL-Lite.
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;CurrentTrackMetaData val=&quot;garbage&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;
        let snapshot = parse_event(xml).unwrap();
        assert_eq!(snapshot.transport_state, TransportState::Playing);
        assert!(snapshot.track.is_none());
    }

    #[test]
    fn decode_yields_owned_values_from_stripped_input() {
        let didl: DidlLite =
            decode(r#"<DIDL-Lite><item><dc:title>T</dc:title></item></DIDL-Lite>"#).unwrap();
        assert_eq!(didl.item.title.as_deref(), Some("T"));
    }

    #[test]
    fn strips_only_element_prefixes() {
        let input = r#"<dc:title id="a:b">x-sonos:spotify:1</dc:title>"#;
        assert_eq!(
            strip_tag_prefixes(input),
            r#"<title id="a:b">x-sonos:spotify:1</title>"#
        );
    }

    #[test]
    fn strip_keeps_declarations_and_self_closing_tags() {
        let input = r#"<?xml version="1.0"?><e:propertyset><e:prop val="v"/></e:propertyset>"#;
        assert_eq!(
            strip_tag_prefixes(input),
            r#"<?xml version="1.0"?><propertyset><prop val="v"/></propertyset>"#
        );
    }
}
