//! Bridge a Sonos group coordinator onto the MPRIS session-bus surface.

mod interfaces;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zbus::connection;
use zbus::zvariant::OwnedValue;

use event_dispatch::{DispatchQueue, EventPump};
use mpris_adapter::{Capabilities, MprisAdapter, TransportControl, MPRIS_PATH, PLAYER_INTERFACE};
use sonos_control::SonosController;

use interfaces::{Announcement, PlayerInterface, RootInterface};

#[derive(Parser, Debug)]
#[command(name = "sonos-mpris", version, about = "Expose a Sonos speaker as an MPRIS player")]
struct Args {
    /// Player identity; also the bus-name suffix (org.mpris.MediaPlayer2.<identity>)
    #[arg(long, default_value = "Sonos")]
    identity: String,

    /// Base URL for album art; defaults to the coordinator's own address
    #[arg(long)]
    art_base_url: Option<String>,

    /// Seconds to wait for SSDP discovery responses
    #[arg(long, default_value_t = 3)]
    discovery_timeout: u64,

    /// Worker poll interval in milliseconds
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,

    /// Requested GENA subscription lease in seconds
    #[arg(long, default_value_t = 1800)]
    subscription_timeout: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let poll_interval = Duration::from_millis(args.poll_interval_ms);

    // Discovery and subscription are synchronous HTTP; keep them off the
    // async executor.
    let discovery_timeout = Duration::from_secs(args.discovery_timeout);
    let controller = tokio::task::spawn_blocking(move || SonosController::connect(discovery_timeout))
        .await?
        .context("no controllable Sonos device found")?;
    let controller = Arc::new(controller);

    let art_base_url = args
        .art_base_url
        .clone()
        .unwrap_or_else(|| controller.device().http_base());
    let adapter = Arc::new(MprisAdapter::new(
        Arc::clone(&controller) as Arc<dyn TransportControl>,
        args.identity.clone(),
        art_base_url,
        Capabilities::default(),
    ));

    let feed = {
        let controller = Arc::clone(&controller);
        let lease = args.subscription_timeout;
        tokio::task::spawn_blocking(move || controller.subscribe(lease))
            .await?
            .context("failed to subscribe to transport events")?
    };

    // Event pipeline: pump pulls parsed snapshots off the feed, the queue's
    // handler worker runs them through the adapter, and announcements go to
    // the async emitter task below.
    let (announce_tx, mut announce_rx) = tokio::sync::mpsc::unbounded_channel::<Announcement>();
    let mut queue = {
        let adapter = Arc::clone(&adapter);
        let announce_tx = announce_tx.clone();
        DispatchQueue::new(poll_interval, move |snapshot| {
            let changed = adapter.on_device_event(snapshot);
            if !changed.is_empty() {
                let _ = announce_tx.send(changed);
            }
        })
    };
    let mut pump = EventPump::start(
        poll_interval,
        move |timeout| feed.recv_timeout(timeout),
        queue.handle(),
    );

    let bus_name = format!("org.mpris.MediaPlayer2.{}", args.identity);
    let connection = connection::Builder::session()?
        .name(bus_name.as_str())?
        .serve_at(MPRIS_PATH, RootInterface::new(Arc::clone(&adapter)))?
        .serve_at(
            MPRIS_PATH,
            PlayerInterface::new(Arc::clone(&adapter), announce_tx.clone()),
        )?
        .build()
        .await
        .context("failed to claim the MPRIS bus name")?;
    info!(bus_name = %bus_name, room = %controller.device().room_name, "bridge running");

    let emitter = {
        let connection = connection.clone();
        tokio::spawn(async move {
            while let Some(changed) = announce_rx.recv().await {
                let properties: HashMap<String, OwnedValue> = changed.into_iter().collect();
                let result = connection
                    .emit_signal(
                        None::<zbus::names::BusName<'_>>,
                        MPRIS_PATH,
                        "org.freedesktop.DBus.Properties",
                        "PropertiesChanged",
                        &(PLAYER_INTERFACE, properties, Vec::<String>::new()),
                    )
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "failed to emit PropertiesChanged");
                }
            }
        })
    };

    wait_for_shutdown(&bus_name, &controller.device().room_name).await?;

    // Stop sequence: quiesce the event pipeline, drop the subscription,
    // then give up the bus name.
    pump.stop();
    queue.stop();
    {
        let controller = Arc::clone(&controller);
        let _ = tokio::task::spawn_blocking(move || controller.disconnect()).await;
    }
    drop(announce_tx);
    let _ = emitter.await;
    let _ = connection.release_name(bus_name.as_str()).await;
    info!("bridge stopped");
    Ok(())
}

/// Block until SIGTERM or SIGINT; SIGUSR1 logs a liveness line.
async fn wait_for_shutdown(bus_name: &str, room: &str) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                return Ok(());
            }
            _ = sigusr1.recv() => {
                info!(bus_name, room, "alive");
            }
        }
    }
}
