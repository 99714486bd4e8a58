//! HTTP listener for GENA NOTIFY callbacks.
//!
//! The device delivers event notifications by making NOTIFY requests back to
//! us, so we run a small warp server for the lifetime of the subscription.
//! The server lives on its own thread with a current-thread tokio runtime;
//! received bodies are forwarded over a std channel so the rest of the crate
//! stays synchronous.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::{debug, warn};
use warp::Filter;

use crate::error::{ControlError, Result};

/// A raw NOTIFY delivery, before any XML parsing.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Subscription ID from the SID header
    pub sid: String,
    /// Raw propertyset XML body
    pub body: String,
}

/// NOTIFY callback server handle.
///
/// Dropping the handle (or calling [`NotifyListener::stop`]) shuts the
/// server down gracefully and joins its thread.
pub struct NotifyListener {
    callback_url: String,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl NotifyListener {
    /// Bind a port in `port_range` and start serving NOTIFY requests.
    ///
    /// Deliveries are pushed into `events`; a full or disconnected receiver
    /// drops the notification rather than blocking the server.
    pub fn start(port_range: (u16, u16), events: mpsc::Sender<Notification>) -> Result<Self> {
        let port = find_available_port(port_range).ok_or_else(|| {
            ControlError::Subscription(format!(
                "no free port in {}-{}",
                port_range.0, port_range.1
            ))
        })?;
        let local_ip = detect_local_ip().ok_or_else(|| {
            ControlError::Subscription("could not determine local IP address".to_string())
        })?;
        let callback_url = format!("http://{local_ip}:{port}/notify");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("notify-listener".to_string())
            .spawn(move || serve(port, events, shutdown_rx, ready_tx))
            .map_err(|e| ControlError::Subscription(format!("failed to spawn listener: {e}")))?;

        // The serving thread signals once the socket is bound so that the
        // callback URL handed to SUBSCRIBE is actually reachable.
        ready_rx
            .recv()
            .map_err(|_| ControlError::Subscription("listener failed to start".to_string()))?;

        debug!(%callback_url, "NOTIFY listener ready");
        Ok(Self {
            callback_url,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// URL to hand to the device in the SUBSCRIBE CALLBACK header.
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for NotifyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    port: u16,
    events: mpsc::Sender<Notification>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ready_tx: mpsc::Sender<()>,
) {
    let route = warp::method()
        .and(warp::header::optional::<String>("sid"))
        .and(warp::header::optional::<String>("nt"))
        .and(warp::body::bytes())
        .and_then(
            move |method: warp::http::Method,
                  sid: Option<String>,
                  nt: Option<String>,
                  body: bytes::Bytes| {
                let events = events.clone();
                async move {
                    if method.as_str() != "NOTIFY" {
                        return Err(warp::reject::not_found());
                    }
                    let Some(sid) = sid else {
                        warn!("NOTIFY without SID header");
                        return Ok(warp::http::StatusCode::BAD_REQUEST);
                    };
                    if nt.as_deref().is_some_and(|nt| nt != "upnp:event") {
                        warn!(?nt, "NOTIFY with unexpected NT header");
                        return Ok(warp::http::StatusCode::BAD_REQUEST);
                    }

                    let body = String::from_utf8_lossy(&body).to_string();
                    debug!(%sid, bytes = body.len(), "NOTIFY received");
                    let _ = events.send(Notification { sid, body });
                    Ok::<_, warp::Rejection>(warp::http::StatusCode::OK)
                }
            },
        );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "failed to build listener runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let (_addr, server) = warp::serve(route).bind_with_graceful_shutdown(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            async move {
                let _ = shutdown_rx.await;
            },
        );
        let _ = ready_tx.send(());
        server.await;
    });
}

fn find_available_port((start, end): (u16, u16)) -> Option<u16> {
    (start..=end).find(|&port| {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    })
}

/// Determine the local address the device can reach us on.
///
/// Connecting a UDP socket to a public address selects the outbound
/// interface without sending any packets.
fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip())
}
