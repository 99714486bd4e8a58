//! The adapter proper: property tables, command dispatch, event intake.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::{debug, warn};
use zbus::zvariant::{OwnedValue, Value};

use sonos_control::{hms_to_seconds, ControlError, Track, TransportSnapshot};

use crate::control::TransportControl;
use crate::error::{AdapterError, Result};
use crate::properties::{PropertyDescriptor, PropertyGetter, PropertyTable};
use crate::{PLAYER_INTERFACE, ROOT_INTERFACE};

/// Which transport commands the device accepts.
///
/// All true for a Sonos coordinator; tests turn individual flags off to
/// exercise the guards.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub can_play: bool,
    pub can_pause: bool,
    pub can_go_next: bool,
    pub can_go_previous: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_play: true,
            can_pause: true,
            can_go_next: true,
            can_go_previous: true,
        }
    }
}

/// Every command the MPRIS surface can carry.
///
/// Commands the bridge deliberately does not implement still appear here so
/// the dispatch names them instead of dropping them ad hoc.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    PlayPause,
    Next,
    Previous,
    Stop,
    Seek { offset_us: i64 },
    SetPosition { position_us: i64 },
    OpenUri { uri: String },
    Raise,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Sent to the device (device errors are absorbed and logged)
    Dispatched,
    /// Blocked by a capability flag; the device was not contacted
    NotAllowed,
    /// Deliberately unimplemented protocol surface
    Unsupported,
}

/// Translates between the device client and the MPRIS protocol surface.
pub struct MprisAdapter {
    control: Arc<dyn TransportControl>,
    caps: Capabilities,
    art_base_url: Arc<str>,
    root: PropertyTable,
    player: PropertyTable,
}

impl MprisAdapter {
    pub fn new(
        control: Arc<dyn TransportControl>,
        identity: impl Into<String>,
        art_base_url: impl Into<String>,
        caps: Capabilities,
    ) -> Self {
        let identity = identity.into();
        let art_base_url: Arc<str> = Arc::from(art_base_url.into());

        let root = PropertyTable::new(ROOT_INTERFACE)
            .with("CanQuit", PropertyDescriptor::read_only(PropertyGetter::constant(false)))
            .with("Fullscreen", PropertyDescriptor::read_only(PropertyGetter::constant(false)))
            .with(
                "CanSetFullscreen",
                PropertyDescriptor::read_only(PropertyGetter::constant(false)),
            )
            .with("CanRaise", PropertyDescriptor::read_only(PropertyGetter::constant(false)))
            .with("HasTrackList", PropertyDescriptor::read_only(PropertyGetter::constant(false)))
            .with("Identity", PropertyDescriptor::read_only(PropertyGetter::constant(identity)))
            .with(
                "SupportedUriSchemes",
                PropertyDescriptor::read_only(PropertyGetter::constant(Vec::<String>::new())),
            )
            .with(
                "SupportedMimeTypes",
                PropertyDescriptor::read_only(PropertyGetter::constant(Vec::<String>::new())),
            );

        let player = PropertyTable::new(PLAYER_INTERFACE)
            .with("PlaybackStatus", {
                let control = Arc::clone(&control);
                PropertyDescriptor::read_only(PropertyGetter::computed(move || {
                    Value::from(playback_status(control.as_ref()))
                        .try_to_owned()
                        .map_err(Into::into)
                }))
            })
            .with(
                "LoopStatus",
                PropertyDescriptor::writable(PropertyGetter::constant("None".to_string()), |_| {}),
            )
            .with(
                "Rate",
                PropertyDescriptor::writable(PropertyGetter::constant(1.0f64), |_| {}),
            )
            .with(
                "Shuffle",
                PropertyDescriptor::writable(PropertyGetter::constant(false), |_| {}),
            )
            .with("Metadata", {
                let control = Arc::clone(&control);
                let art_base_url = Arc::clone(&art_base_url);
                PropertyDescriptor::read_only(PropertyGetter::computed(move || {
                    let map = metadata_map(control.as_ref(), &art_base_url)?;
                    Value::from(map).try_to_owned().map_err(Into::into)
                }))
            })
            .with(
                "Volume",
                PropertyDescriptor::writable(PropertyGetter::constant(0.0f64), |_| {}),
            )
            .with("Position", {
                let control = Arc::clone(&control);
                PropertyDescriptor::read_only(PropertyGetter::computed(move || {
                    Value::from(position_us(control.as_ref()))
                        .try_to_owned()
                        .map_err(Into::into)
                }))
            })
            .with("MinimumRate", PropertyDescriptor::read_only(PropertyGetter::constant(1.0f64)))
            .with("MaximumRate", PropertyDescriptor::read_only(PropertyGetter::constant(1.0f64)))
            .with(
                "CanGoNext",
                PropertyDescriptor::read_only(PropertyGetter::constant(caps.can_go_next)),
            )
            .with(
                "CanGoPrevious",
                PropertyDescriptor::read_only(PropertyGetter::constant(caps.can_go_previous)),
            )
            .with(
                "CanPlay",
                PropertyDescriptor::read_only(PropertyGetter::constant(caps.can_play)),
            )
            .with(
                "CanPause",
                PropertyDescriptor::read_only(PropertyGetter::constant(caps.can_pause)),
            )
            .with("CanSeek", PropertyDescriptor::read_only(PropertyGetter::constant(true)))
            .with("CanControl", PropertyDescriptor::read_only(PropertyGetter::constant(true)));

        Self {
            control,
            caps,
            art_base_url,
            root,
            player,
        }
    }

    fn table(&self, interface: &str) -> Result<&PropertyTable> {
        match interface {
            ROOT_INTERFACE => Ok(&self.root),
            PLAYER_INTERFACE => Ok(&self.player),
            other => Err(AdapterError::UnknownInterface(other.to_string())),
        }
    }

    pub fn get(&self, interface: &str, property: &str) -> Result<OwnedValue> {
        self.table(interface)?.get(property)
    }

    pub fn get_all(&self, interface: &str) -> Result<HashMap<String, OwnedValue>> {
        self.table(interface)?.get_all()
    }

    /// Write a property. `Ok(Some(name))` names the property to re-announce.
    pub fn set(
        &self,
        interface: &str,
        property: &str,
        value: &Value<'_>,
    ) -> Result<Option<&'static str>> {
        self.table(interface)?.set(property, value)
    }

    /// Current playback status, exactly `"Playing"` or `"Paused"`.
    pub fn playback_status(&self) -> &'static str {
        playback_status(self.control.as_ref())
    }

    /// Current metadata dictionary.
    pub fn metadata(&self) -> Result<HashMap<String, OwnedValue>> {
        metadata_map(self.control.as_ref(), &self.art_base_url)
    }

    /// Elapsed position in microseconds; failures report zero.
    pub fn position_us(&self) -> i64 {
        position_us(self.control.as_ref())
    }

    /// Ingest a device event: store the snapshot, then report the property
    /// values to announce. Always both, freshly evaluated; no diffing.
    pub fn on_device_event(&self, snapshot: TransportSnapshot) -> Vec<(String, OwnedValue)> {
        self.control.apply_event(snapshot);

        let mut changed = Vec::with_capacity(2);
        for name in ["PlaybackStatus", "Metadata"] {
            match self.player.get(name) {
                Ok(value) => changed.push((name.to_string(), value)),
                Err(e) => warn!(property = name, error = %e, "failed to evaluate property"),
            }
        }
        changed
    }

    /// Run a transport command, honoring capability flags.
    pub fn handle(&self, command: PlayerCommand) -> CommandOutcome {
        match command {
            PlayerCommand::Play => self.guarded(self.caps.can_play, "Play", || self.control.play()),
            PlayerCommand::Pause => {
                self.guarded(self.caps.can_pause, "Pause", || self.control.pause())
            }
            PlayerCommand::PlayPause => {
                if self.control.is_playing() {
                    self.guarded(self.caps.can_pause, "PlayPause", || self.control.pause())
                } else {
                    self.guarded(self.caps.can_play, "PlayPause", || self.control.play())
                }
            }
            PlayerCommand::Next => {
                self.guarded(self.caps.can_go_next, "Next", || self.control.next())
            }
            PlayerCommand::Previous => self.guarded(self.caps.can_go_previous, "Previous", || {
                self.control.previous()
            }),
            unsupported => {
                debug!(command = ?unsupported, "ignoring unsupported command");
                CommandOutcome::Unsupported
            }
        }
    }

    fn guarded(
        &self,
        allowed: bool,
        name: &str,
        op: impl FnOnce() -> std::result::Result<(), ControlError>,
    ) -> CommandOutcome {
        if !allowed {
            debug!(command = name, "command blocked by capability flag");
            return CommandOutcome::NotAllowed;
        }
        if let Err(e) = op() {
            warn!(command = name, error = %e, "device command failed");
        }
        CommandOutcome::Dispatched
    }
}

fn playback_status(control: &dyn TransportControl) -> &'static str {
    // Transitioning and pre-event states both read as Paused; the bridge
    // never reports Stopped.
    if control.is_playing() {
        "Playing"
    } else {
        "Paused"
    }
}

fn position_us(control: &dyn TransportControl) -> i64 {
    match control.position_seconds() {
        Ok(seconds) => i64::try_from(seconds).unwrap_or(0).saturating_mul(1_000_000),
        Err(e) => {
            debug!(error = %e, "position query failed, reporting 0");
            0
        }
    }
}

fn metadata_map(
    control: &dyn TransportControl,
    art_base_url: &str,
) -> Result<HashMap<String, OwnedValue>> {
    let mut map = HashMap::new();

    let Some(track) = control.current_track() else {
        map.insert("mpris:trackid".to_string(), owned(Value::from(""))?);
        return Ok(map);
    };

    map.insert("mpris:trackid".to_string(), owned(Value::from(track_id(&track)))?);
    map.insert("xesam:title".to_string(), owned(Value::from(track.title.clone()))?);
    map.insert(
        "xesam:artist".to_string(),
        owned(Value::from(vec![track.artist.clone()]))?,
    );
    map.insert("xesam:album".to_string(), owned(Value::from(track.album.clone()))?);

    match hms_to_seconds(&track.duration) {
        Ok(seconds) => {
            let length = i64::try_from(seconds).unwrap_or(0).saturating_mul(1_000_000);
            map.insert("mpris:length".to_string(), owned(Value::from(length))?);
        }
        Err(e) => debug!(duration = %track.duration, error = %e, "skipping mpris:length"),
    }

    if !track.album_art_uri.is_empty() {
        map.insert(
            "mpris:artUrl".to_string(),
            owned(Value::from(art_url(art_base_url, &track.album_art_uri)))?,
        );
    }

    Ok(map)
}

fn owned(value: Value<'_>) -> Result<OwnedValue> {
    value.try_to_owned().map_err(Into::into)
}

/// Stable track identifier derived from the metadata itself, so the same
/// track yields the same id across events and restarts.
fn track_id(track: &Track) -> String {
    let mut hasher = DefaultHasher::new();
    track.title.hash(&mut hasher);
    track.artist.hash(&mut hasher);
    track.album.hash(&mut hasher);
    format!("/org/mpris/MediaPlayer2/track/{:016x}", hasher.finish())
}

fn art_url(base: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }
    let base = base.trim_end_matches('/');
    if uri.starts_with('/') {
        format!("{base}{uri}")
    } else {
        format!("{base}/{uri}")
    }
}
