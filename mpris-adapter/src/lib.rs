//! MPRIS protocol adaptation for a Sonos transport.
//!
//! This crate owns the translation layer between device state and the two
//! MPRIS D-Bus interfaces. Property values live in descriptor tables built
//! once at startup ([`MprisAdapter::new`]); the D-Bus host stays a thin
//! shell that forwards get/set/command calls here.

mod adapter;
mod control;
mod error;
mod properties;

pub use adapter::{Capabilities, CommandOutcome, MprisAdapter, PlayerCommand};
pub use control::TransportControl;
pub use error::{AdapterError, Result};
pub use properties::{PropertyDescriptor, PropertyGetter, PropertyTable};

/// D-Bus object path every MPRIS player exposes.
pub const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
/// The application-level MPRIS interface.
pub const ROOT_INTERFACE: &str = "org.mpris.MediaPlayer2";
/// The playback-control MPRIS interface.
pub const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
