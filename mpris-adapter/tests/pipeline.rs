//! End-to-end: device event XML through the dispatch queue to MPRIS values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use event_dispatch::DispatchQueue;
use mpris_adapter::{Capabilities, MprisAdapter, TransportControl};
use sonos_control::{parse_event, ControlError, Track, TransportSnapshot};

/// Minimal in-memory transport, standing in for a live coordinator.
struct MemoryTransport {
    playing: AtomicBool,
    track: Mutex<Option<Track>>,
}

impl MemoryTransport {
    fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            track: Mutex::new(None),
        }
    }
}

impl TransportControl for MemoryTransport {
    fn play(&self) -> Result<(), ControlError> {
        Ok(())
    }
    fn pause(&self) -> Result<(), ControlError> {
        Ok(())
    }
    fn next(&self) -> Result<(), ControlError> {
        Ok(())
    }
    fn previous(&self) -> Result<(), ControlError> {
        Ok(())
    }
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
    fn current_track(&self) -> Option<Track> {
        self.track.lock().unwrap().clone()
    }
    fn position_seconds(&self) -> Result<u64, ControlError> {
        Ok(0)
    }
    fn apply_event(&self, snapshot: TransportSnapshot) {
        self.playing
            .store(snapshot.transport_state.is_playing(), Ordering::SeqCst);
        *self.track.lock().unwrap() = snapshot.track;
    }
}

// A playing event carrying a 3:45 track, as the device NOTIFYs it:
// propertyset -> escaped LastChange -> doubly escaped DIDL-Lite.
const PLAYING_EVENT: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;CurrentTrackDuration val=&quot;00:03:45&quot;/&gt;&lt;CurrentTrackMetaData val=&quot;&amp;lt;DIDL-Lite xmlns:dc=&amp;quot;http://purl.org/dc/elements/1.1/&amp;quot; xmlns:upnp=&amp;quot;urn:schemas-upnp-org:metadata-1-0/upnp/&amp;quot;&amp;gt;&amp;lt;item id=&amp;quot;-1&amp;quot; parentID=&amp;quot;-1&amp;quot;&amp;gt;&amp;lt;res duration=&amp;quot;00:03:45&amp;quot;&amp;gt;x-sonos-spotify:track:1&amp;lt;/res&amp;gt;&amp;lt;dc:title&amp;gt;Pipeline Song&amp;lt;/dc:title&amp;gt;&amp;lt;dc:creator&amp;gt;Pipeline Artist&amp;lt;/dc:creator&amp;gt;&amp;lt;upnp:album&amp;gt;Pipeline Album&amp;lt;/upnp:album&amp;gt;&amp;lt;/item&amp;gt;&amp;lt;/DIDL-Lite&amp;gt;&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;

#[test]
fn playing_event_reaches_mpris_values_through_the_queue() {
    let transport = Arc::new(MemoryTransport::new());
    let adapter = Arc::new(MprisAdapter::new(
        Arc::clone(&transport) as Arc<dyn TransportControl>,
        "Sonos",
        "http://192.168.1.100:1400",
        Capabilities::default(),
    ));

    // Handler worker wired exactly like the daemon: each snapshot goes to
    // the adapter, the announced properties go out over a channel.
    let (announce_tx, announce_rx) = mpsc::channel();
    let mut queue = {
        let adapter = Arc::clone(&adapter);
        DispatchQueue::new(Duration::from_millis(50), move |snapshot| {
            let _ = announce_tx.send(adapter.on_device_event(snapshot));
        })
    };

    let snapshot = parse_event(PLAYING_EVENT).expect("event should parse");
    assert!(queue.handle().execute(snapshot));

    let changed = announce_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("announcement should arrive");
    queue.stop();

    let names: Vec<_> = changed.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["PlaybackStatus", "Metadata"]);

    assert_eq!(adapter.playback_status(), "Playing");
    let metadata = adapter.metadata().unwrap();
    assert_eq!(
        metadata["mpris:length"].downcast_ref::<i64>().unwrap(),
        225_000_000
    );
    assert_eq!(
        metadata["xesam:title"].downcast_ref::<&str>().unwrap(),
        "Pipeline Song"
    );
}
