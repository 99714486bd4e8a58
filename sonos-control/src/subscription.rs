//! GENA subscription lifecycle and the parsed event feed.
//!
//! A subscription pairs a NOTIFY listener with a lease on the device's
//! AVTransport event endpoint. A background worker renews the lease at half
//! its granted duration; if a renewal is rejected (device rebooted, lease
//! expired) it falls back to opening a fresh subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::avtransport::EVENT_ENDPOINT;
use crate::device::Device;
use crate::error::Result;
use crate::event::parse_event;
use crate::listener::{Notification, NotifyListener};
use crate::soap::SoapClient;
use crate::track::TransportSnapshot;

const LISTENER_PORT_RANGE: (u16, u16) = (3400, 3500);
const WORKER_TICK: Duration = Duration::from_millis(250);

/// Receiving half of a subscription: parsed transport snapshots.
pub struct EventFeed {
    rx: mpsc::Receiver<Notification>,
}

impl EventFeed {
    /// Wait up to `timeout` for the next parseable event.
    ///
    /// Notifications that fail to parse are logged and skipped without
    /// consuming the caller's patience for a real event; `None` means the
    /// deadline passed quietly.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TransportSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let notification = self.rx.recv_timeout(remaining).ok()?;
            match parse_event(&notification.body) {
                Ok(snapshot) => return Some(snapshot),
                Err(e) => {
                    warn!(sid = %notification.sid, error = %e, "dropping unparseable event");
                }
            }
        }
    }
}

/// An active AVTransport event subscription.
pub struct EventSubscription {
    listener: NotifyListener,
    soap: SoapClient,
    ip: String,
    port: u16,
    sid: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
    renew_worker: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Subscribe to the device's AVTransport events.
    ///
    /// `timeout_seconds` is the requested lease duration; the device may
    /// grant less, and renewal follows whatever was actually granted.
    pub fn subscribe(device: &Device, timeout_seconds: u32) -> Result<(Self, EventFeed)> {
        let (tx, rx) = mpsc::channel();
        let listener = NotifyListener::start(LISTENER_PORT_RANGE, tx)?;

        let soap = SoapClient::new();
        let grant = soap.subscribe(
            &device.ip,
            device.port,
            EVENT_ENDPOINT,
            listener.callback_url(),
            timeout_seconds,
        )?;
        info!(sid = %grant.sid, lease = grant.timeout_seconds, "subscribed to transport events");

        let sid = Arc::new(Mutex::new(grant.sid));
        let running = Arc::new(AtomicBool::new(true));

        let renew_worker = {
            let soap = soap.clone();
            let ip = device.ip.clone();
            let port = device.port;
            let callback_url = listener.callback_url().to_string();
            let sid = Arc::clone(&sid);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("subscription-renewal".to_string())
                .spawn(move || {
                    renew_loop(
                        soap,
                        &ip,
                        port,
                        &callback_url,
                        timeout_seconds,
                        grant.timeout_seconds,
                        sid,
                        running,
                    )
                })
                .map_err(|e| {
                    crate::error::ControlError::Subscription(format!(
                        "failed to spawn renewal worker: {e}"
                    ))
                })?
        };

        let subscription = Self {
            listener,
            soap,
            ip: device.ip.clone(),
            port: device.port,
            sid,
            running,
            renew_worker: Some(renew_worker),
        };
        Ok((subscription, EventFeed { rx }))
    }

    /// Cancel the subscription and tear down the listener.
    pub fn unsubscribe(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.renew_worker.take() {
            let _ = worker.join();
        }
        let sid = self.sid.lock().clone();
        if let Err(e) = self.soap.unsubscribe(&self.ip, self.port, EVENT_ENDPOINT, &sid) {
            warn!(error = %e, "UNSUBSCRIBE failed");
        }
        self.listener.stop();
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[allow(clippy::too_many_arguments)]
fn renew_loop(
    soap: SoapClient,
    ip: &str,
    port: u16,
    callback_url: &str,
    requested_seconds: u32,
    initial_lease: u32,
    sid: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
) {
    let mut lease = initial_lease.max(2);
    loop {
        // Renew at half the lease, waking regularly so shutdown is prompt.
        let deadline = Instant::now() + Duration::from_secs(u64::from(lease) / 2);
        while Instant::now() < deadline {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(WORKER_TICK);
        }
        if !running.load(Ordering::SeqCst) {
            return;
        }

        let current = sid.lock().clone();
        match soap.renew(ip, port, EVENT_ENDPOINT, &current, requested_seconds) {
            Ok(granted) => {
                debug!(sid = %current, lease = granted, "subscription renewed");
                lease = granted.max(2);
            }
            Err(renew_err) => {
                warn!(error = %renew_err, "renewal failed, resubscribing");
                match soap.subscribe(ip, port, EVENT_ENDPOINT, callback_url, requested_seconds) {
                    Ok(grant) => {
                        info!(sid = %grant.sid, "resubscribed after failed renewal");
                        *sid.lock() = grant.sid;
                        lease = grant.timeout_seconds.max(2);
                    }
                    Err(e) => {
                        // Try again after a short lease; the device may just
                        // be rebooting.
                        warn!(error = %e, "resubscribe failed, will retry");
                        lease = 60;
                    }
                }
            }
        }
    }
}
