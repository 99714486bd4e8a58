//! Transport state, track metadata, and duration parsing.

use crate::error::{ControlError, Result};

/// Playback activity reported by the device's AVTransport service.
///
/// Unknown strings are preserved opaquely rather than rejected; the device
/// firmware occasionally reports states outside the documented set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    Playing,
    PausedPlayback,
    Stopped,
    Transitioning,
    Other(String),
}

impl TransportState {
    /// Parse the device's SCREAMING_SNAKE transport-state string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PLAYING" => TransportState::Playing,
            "PAUSED_PLAYBACK" => TransportState::PausedPlayback,
            "STOPPED" => TransportState::Stopped,
            "TRANSITIONING" => TransportState::Transitioning,
            other => TransportState::Other(other.to_string()),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

/// Metadata for the track currently loaded on the transport.
///
/// Field values come straight from the device's DIDL-Lite item; missing
/// elements become empty strings. `duration` keeps the device's `H:MM:SS`
/// form and `album_art_uri` is relative to the device's HTTP root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_art_uri: String,
    pub duration: String,
}

/// Last-observed state of the device's transport.
///
/// Replaced wholesale on every event; `track` is `None` when no track is
/// loaded. Absence of a snapshot altogether (before the first event) is
/// represented by the holder, not by this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub transport_state: TransportState,
    pub track: Option<Track>,
}

/// Convert a `H:MM:SS` duration string to whole seconds.
///
/// The device always reports exactly three colon-separated numeric
/// components. Anything else is a parse error, which callers absorb and log
/// rather than propagate to the protocol host.
pub fn hms_to_seconds(duration: &str) -> Result<u64> {
    let parts: Vec<&str> = duration.split(':').collect();
    if parts.len() != 3 {
        return Err(ControlError::Parse(format!(
            "expected H:MM:SS duration, got {duration:?}"
        )));
    }

    let mut components = [0u64; 3];
    for (slot, part) in components.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| {
            ControlError::Parse(format!("non-numeric duration component in {duration:?}"))
        })?;
    }

    let [hours, minutes, seconds] = components;
    hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(seconds))
        .ok_or_else(|| ControlError::Parse(format!("duration out of range: {duration:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_known_transport_states() {
        assert_eq!(TransportState::parse("PLAYING"), TransportState::Playing);
        assert_eq!(
            TransportState::parse("PAUSED_PLAYBACK"),
            TransportState::PausedPlayback
        );
        assert_eq!(TransportState::parse("STOPPED"), TransportState::Stopped);
        assert_eq!(
            TransportState::parse("TRANSITIONING"),
            TransportState::Transitioning
        );
    }

    #[test]
    fn preserves_unknown_transport_states() {
        let state = TransportState::parse("VENDOR_DEFINED_THING");
        assert_eq!(
            state,
            TransportState::Other("VENDOR_DEFINED_THING".to_string())
        );
        assert!(!state.is_playing());
    }

    #[test]
    fn hms_conversion_is_exact() {
        assert_eq!(hms_to_seconds("01:02:03").unwrap(), 3723);
        assert_eq!(hms_to_seconds("0:00:00").unwrap(), 0);
        assert_eq!(hms_to_seconds("0:03:45").unwrap(), 225);
        assert_eq!(hms_to_seconds("10:00:01").unwrap(), 36001);
    }

    #[test]
    fn hms_rejects_wrong_component_count() {
        assert!(hms_to_seconds("03:45").is_err());
        assert!(hms_to_seconds("1:2:3:4").is_err());
        assert!(hms_to_seconds("").is_err());
    }

    #[test]
    fn hms_rejects_overflowing_durations() {
        assert!(hms_to_seconds("9999999999999999999:00:00").is_err());
        assert!(hms_to_seconds("0:18446744073709551615:00").is_err());
        assert!(hms_to_seconds("18446744073709551615:00:01").is_err());
    }

    #[test]
    fn hms_rejects_non_numeric_components() {
        assert!(hms_to_seconds("aa:00:00").is_err());
        assert!(hms_to_seconds("0:xx:00").is_err());
        assert!(hms_to_seconds("0:00:3.5").is_err());
    }

    proptest! {
        #[test]
        fn hms_matches_arithmetic(h in 0u64..100, m in 0u64..60, s in 0u64..60) {
            let formatted = format!("{h:02}:{m:02}:{s:02}");
            prop_assert_eq!(hms_to_seconds(&formatted).unwrap(), h * 3600 + m * 60 + s);
        }
    }
}
