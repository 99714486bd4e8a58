//! Sonos device control over UPnP.
//!
//! This crate finds the group coordinator on the local network and exposes
//! everything the bridge needs from it:
//!
//! - SSDP discovery and coordinator selection ([`discover`], [`find_coordinator`])
//! - SOAP transport commands and position queries ([`SonosController`])
//! - GENA event subscriptions with automatic renewal ([`EventSubscription`])
//! - LastChange event decoding into [`TransportSnapshot`] values
//!
//! Everything here is synchronous; the NOTIFY callback server runs its own
//! runtime internally and hands events back over a channel.

mod avtransport;
mod controller;
mod device;
mod discovery;
mod error;
mod event;
mod listener;
mod soap;
mod ssdp;
mod subscription;
mod track;

pub use avtransport::PositionInfo;
pub use controller::SonosController;
pub use device::Device;
pub use discovery::{discover, find_coordinator};
pub use error::{ControlError, Result};
pub use event::parse_event;
pub use listener::{Notification, NotifyListener};
pub use subscription::{EventFeed, EventSubscription};
pub use track::{hms_to_seconds, Track, TransportSnapshot, TransportState};
