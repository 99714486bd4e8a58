//! Consumption boundary between the adapter and the device client.

use sonos_control::{ControlError, SonosController, Track, TransportSnapshot};

/// What the adapter needs from a playback device.
///
/// `SonosController` is the production implementation; tests script their
/// own. All methods are callable from any thread: commands and the position
/// query come in on D-Bus handler tasks while `apply_event` runs on the
/// dispatch worker.
pub trait TransportControl: Send + Sync {
    fn play(&self) -> Result<(), ControlError>;
    fn pause(&self) -> Result<(), ControlError>;
    fn next(&self) -> Result<(), ControlError>;
    fn previous(&self) -> Result<(), ControlError>;

    /// Whether the last observed transport state was actively playing.
    fn is_playing(&self) -> bool;

    /// Track loaded as of the last event, if any.
    fn current_track(&self) -> Option<Track>;

    /// Live query of elapsed seconds within the current track.
    fn position_seconds(&self) -> Result<u64, ControlError>;

    /// Store a newly received snapshot for subsequent reads.
    fn apply_event(&self, snapshot: TransportSnapshot);
}

impl TransportControl for SonosController {
    fn play(&self) -> Result<(), ControlError> {
        SonosController::play(self)
    }

    fn pause(&self) -> Result<(), ControlError> {
        SonosController::pause(self)
    }

    fn next(&self) -> Result<(), ControlError> {
        SonosController::next(self)
    }

    fn previous(&self) -> Result<(), ControlError> {
        SonosController::previous(self)
    }

    fn is_playing(&self) -> bool {
        SonosController::is_playing(self)
    }

    fn current_track(&self) -> Option<Track> {
        SonosController::current_track(self)
    }

    fn position_seconds(&self) -> Result<u64, ControlError> {
        SonosController::position(self)
    }

    fn apply_event(&self, snapshot: TransportSnapshot) {
        SonosController::apply_event(self, snapshot)
    }
}
