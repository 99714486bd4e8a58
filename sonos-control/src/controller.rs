//! High-level handle on the group coordinator.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::avtransport::AvTransport;
use crate::device::Device;
use crate::discovery;
use crate::error::Result;
use crate::subscription::{EventFeed, EventSubscription};
use crate::track::{hms_to_seconds, Track, TransportSnapshot};

/// Control handle for the group coordinator.
///
/// Commands go straight to the device over SOAP. Reads come from the last
/// event snapshot, which the event pipeline pushes in via [`apply_event`];
/// until the first event arrives there is no snapshot and reads report an
/// idle transport.
///
/// [`apply_event`]: SonosController::apply_event
pub struct SonosController {
    device: Device,
    transport: AvTransport,
    snapshot: RwLock<Option<Arc<TransportSnapshot>>>,
    subscription: Mutex<Option<EventSubscription>>,
}

impl SonosController {
    /// Discover the network and attach to the group coordinator.
    pub fn connect(discovery_timeout: Duration) -> Result<Self> {
        let device = discovery::find_coordinator(discovery_timeout)?;
        info!(room = %device.room_name, ip = %device.ip, "attached to coordinator");
        Ok(Self::from_device(device))
    }

    /// Attach to a known device, skipping discovery.
    pub fn from_device(device: Device) -> Self {
        let transport = AvTransport::new(&device);
        Self {
            device,
            transport,
            snapshot: RwLock::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn play(&self) -> Result<()> {
        self.transport.play()
    }

    pub fn pause(&self) -> Result<()> {
        self.transport.pause()
    }

    pub fn next(&self) -> Result<()> {
        self.transport.next()
    }

    pub fn previous(&self) -> Result<()> {
        self.transport.previous()
    }

    /// Elapsed seconds within the current track, queried live.
    pub fn position(&self) -> Result<u64> {
        let info = self.transport.position_info()?;
        hms_to_seconds(&info.rel_time)
    }

    /// Whether the transport was playing as of the last event.
    pub fn is_playing(&self) -> bool {
        self.snapshot
            .read()
            .as_ref()
            .is_some_and(|s| s.transport_state.is_playing())
    }

    /// The track loaded as of the last event, if any.
    pub fn current_track(&self) -> Option<Track> {
        self.snapshot.read().as_ref()?.track.clone()
    }

    /// Replace the stored snapshot with a newly received one.
    pub fn apply_event(&self, snapshot: TransportSnapshot) {
        *self.snapshot.write() = Some(Arc::new(snapshot));
    }

    /// Open an event subscription against this device.
    ///
    /// The subscription (with its renewal worker and NOTIFY listener) is
    /// held by the controller until [`disconnect`]; only the feed is handed
    /// back. Subscribing again replaces any existing subscription.
    ///
    /// [`disconnect`]: SonosController::disconnect
    pub fn subscribe(&self, timeout_seconds: u32) -> Result<EventFeed> {
        let (subscription, feed) = EventSubscription::subscribe(&self.device, timeout_seconds)?;
        if let Some(mut old) = self.subscription.lock().replace(subscription) {
            old.unsubscribe();
        }
        Ok(feed)
    }

    /// Tear down the event subscription, if any. Idempotent.
    pub fn disconnect(&self) {
        if let Some(mut subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}
