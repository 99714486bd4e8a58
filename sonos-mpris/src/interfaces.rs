//! D-Bus interface shells over the adapter.
//!
//! These structs carry no behavior of their own: every getter, setter, and
//! method delegates to the adapter's property tables and command dispatch.
//! Commands and the Position query touch the device over HTTP, so those go
//! through `spawn_blocking` rather than stalling the connection executor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};
use zbus::{fdo, interface};

use mpris_adapter::{
    AdapterError, MprisAdapter, PlayerCommand, PLAYER_INTERFACE, ROOT_INTERFACE,
};

/// Property values queued for a PropertiesChanged emission.
pub type Announcement = Vec<(String, OwnedValue)>;

fn to_fdo(err: AdapterError) -> fdo::Error {
    match err {
        AdapterError::UnknownInterface(_) => fdo::Error::UnknownInterface(err.to_string()),
        AdapterError::UnknownProperty { .. } => fdo::Error::UnknownProperty(err.to_string()),
        AdapterError::Value(e) => fdo::Error::Failed(e.to_string()),
    }
}

/// Read a property out of the adapter tables as a concrete D-Bus type.
fn prop<T>(adapter: &MprisAdapter, interface: &str, property: &str) -> fdo::Result<T>
where
    T: TryFrom<OwnedValue, Error = zbus::zvariant::Error>,
{
    let value = adapter.get(interface, property).map_err(to_fdo)?;
    T::try_from(value).map_err(|e| fdo::Error::Failed(e.to_string()))
}

async fn dispatch(adapter: &Arc<MprisAdapter>, command: PlayerCommand) {
    let adapter = Arc::clone(adapter);
    let outcome = tokio::task::spawn_blocking(move || adapter.handle(command)).await;
    if let Err(e) = outcome {
        warn!(error = %e, "command task failed");
    }
}

pub struct RootInterface {
    adapter: Arc<MprisAdapter>,
}

impl RootInterface {
    pub fn new(adapter: Arc<MprisAdapter>) -> Self {
        Self { adapter }
    }
}

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootInterface {
    async fn raise(&self) {
        dispatch(&self.adapter, PlayerCommand::Raise).await;
    }

    async fn quit(&self) {
        dispatch(&self.adapter, PlayerCommand::Quit).await;
    }

    #[zbus(property)]
    fn can_quit(&self) -> fdo::Result<bool> {
        prop(&self.adapter, ROOT_INTERFACE, "CanQuit")
    }

    #[zbus(property)]
    fn fullscreen(&self) -> fdo::Result<bool> {
        prop(&self.adapter, ROOT_INTERFACE, "Fullscreen")
    }

    #[zbus(property)]
    fn set_fullscreen(&self, value: bool) {
        let _ = self
            .adapter
            .set(ROOT_INTERFACE, "Fullscreen", &Value::from(value));
    }

    #[zbus(property)]
    fn can_set_fullscreen(&self) -> fdo::Result<bool> {
        prop(&self.adapter, ROOT_INTERFACE, "CanSetFullscreen")
    }

    #[zbus(property)]
    fn can_raise(&self) -> fdo::Result<bool> {
        prop(&self.adapter, ROOT_INTERFACE, "CanRaise")
    }

    #[zbus(property)]
    fn has_track_list(&self) -> fdo::Result<bool> {
        prop(&self.adapter, ROOT_INTERFACE, "HasTrackList")
    }

    #[zbus(property)]
    fn identity(&self) -> fdo::Result<String> {
        prop(&self.adapter, ROOT_INTERFACE, "Identity")
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> fdo::Result<Vec<String>> {
        prop(&self.adapter, ROOT_INTERFACE, "SupportedUriSchemes")
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> fdo::Result<Vec<String>> {
        prop(&self.adapter, ROOT_INTERFACE, "SupportedMimeTypes")
    }
}

pub struct PlayerInterface {
    adapter: Arc<MprisAdapter>,
    announce: UnboundedSender<Announcement>,
}

impl PlayerInterface {
    pub fn new(adapter: Arc<MprisAdapter>, announce: UnboundedSender<Announcement>) -> Self {
        Self { adapter, announce }
    }

    /// A setter ran; queue the property's fresh value for re-announcement.
    fn announce_changed(&self, property: &'static str) {
        match self.adapter.get(PLAYER_INTERFACE, property) {
            Ok(value) => {
                let _ = self.announce.send(vec![(property.to_string(), value)]);
            }
            Err(e) => warn!(property, error = %e, "failed to evaluate property"),
        }
    }

    fn set_property(&self, property: &str, value: Value<'_>) {
        match self.adapter.set(PLAYER_INTERFACE, property, &value) {
            Ok(Some(changed)) => self.announce_changed(changed),
            Ok(None) => {}
            Err(e) => warn!(property, error = %e, "property write rejected"),
        }
    }
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerInterface {
    async fn play(&self) {
        dispatch(&self.adapter, PlayerCommand::Play).await;
    }

    async fn pause(&self) {
        dispatch(&self.adapter, PlayerCommand::Pause).await;
    }

    async fn play_pause(&self) {
        dispatch(&self.adapter, PlayerCommand::PlayPause).await;
    }

    async fn stop(&self) {
        dispatch(&self.adapter, PlayerCommand::Stop).await;
    }

    async fn next(&self) {
        dispatch(&self.adapter, PlayerCommand::Next).await;
    }

    async fn previous(&self) {
        dispatch(&self.adapter, PlayerCommand::Previous).await;
    }

    async fn seek(&self, offset: i64) {
        dispatch(&self.adapter, PlayerCommand::Seek { offset_us: offset }).await;
    }

    async fn set_position(&self, track_id: ObjectPath<'_>, position: i64) {
        let _ = track_id;
        dispatch(
            &self.adapter,
            PlayerCommand::SetPosition {
                position_us: position,
            },
        )
        .await;
    }

    async fn open_uri(&self, uri: String) {
        dispatch(&self.adapter, PlayerCommand::OpenUri { uri }).await;
    }

    #[zbus(signal)]
    async fn seeked(emitter: &SignalEmitter<'_>, position: i64) -> zbus::Result<()>;

    #[zbus(property)]
    fn playback_status(&self) -> fdo::Result<String> {
        prop(&self.adapter, PLAYER_INTERFACE, "PlaybackStatus")
    }

    #[zbus(property)]
    fn loop_status(&self) -> fdo::Result<String> {
        prop(&self.adapter, PLAYER_INTERFACE, "LoopStatus")
    }

    #[zbus(property)]
    fn set_loop_status(&self, value: String) {
        self.set_property("LoopStatus", Value::from(value));
    }

    #[zbus(property)]
    fn rate(&self) -> fdo::Result<f64> {
        prop(&self.adapter, PLAYER_INTERFACE, "Rate")
    }

    #[zbus(property)]
    fn set_rate(&self, value: f64) {
        self.set_property("Rate", Value::from(value));
    }

    #[zbus(property)]
    fn shuffle(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "Shuffle")
    }

    #[zbus(property)]
    fn set_shuffle(&self, value: bool) {
        self.set_property("Shuffle", Value::from(value));
    }

    #[zbus(property)]
    fn metadata(&self) -> fdo::Result<HashMap<String, OwnedValue>> {
        self.adapter.metadata().map_err(to_fdo)
    }

    #[zbus(property)]
    fn volume(&self) -> fdo::Result<f64> {
        prop(&self.adapter, PLAYER_INTERFACE, "Volume")
    }

    #[zbus(property)]
    fn set_volume(&self, value: f64) {
        self.set_property("Volume", Value::from(value));
    }

    #[zbus(property)]
    async fn position(&self) -> fdo::Result<i64> {
        // Live SOAP query against the device.
        let adapter = Arc::clone(&self.adapter);
        tokio::task::spawn_blocking(move || adapter.position_us())
            .await
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    #[zbus(property)]
    fn minimum_rate(&self) -> fdo::Result<f64> {
        prop(&self.adapter, PLAYER_INTERFACE, "MinimumRate")
    }

    #[zbus(property)]
    fn maximum_rate(&self) -> fdo::Result<f64> {
        prop(&self.adapter, PLAYER_INTERFACE, "MaximumRate")
    }

    #[zbus(property)]
    fn can_go_next(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "CanGoNext")
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "CanGoPrevious")
    }

    #[zbus(property)]
    fn can_play(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "CanPlay")
    }

    #[zbus(property)]
    fn can_pause(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "CanPause")
    }

    #[zbus(property)]
    fn can_seek(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "CanSeek")
    }

    #[zbus(property)]
    fn can_control(&self) -> fdo::Result<bool> {
        prop(&self.adapter, PLAYER_INTERFACE, "CanControl")
    }
}
