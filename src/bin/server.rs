//! Audio Streaming Server
//!
//! Captures PCM audio from an OS-level capture subprocess and fans it
//! out to raw-protocol and codec-stream clients.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_audio_streamer::{
    broadcast::{registry::HeaderSlot, CodecRegistry, Packetizer, RawBroadcaster},
    capture::{
        capture_command, check_capture_utilities, device::probe_mac_audio_devices,
        CaptureSupervisor, Platform,
    },
    codec::{Codec, CodecProvider},
    config::AppConfig,
    constants::RAW_CHANNEL_CAPACITY,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Live Audio Streamer");

    // Load config from an explicit path or the platform default
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    let platform = Platform::current()?;

    // A missing capture utility is fatal: the raw path cannot start.
    check_capture_utilities(platform, &config.audio).await?;

    // One-time device probe, only needed for the macOS sox path.
    let mac_devices = if platform == Platform::MacOs && !config.audio.prefer_ffmpeg_capture {
        probe_mac_audio_devices().await
    } else {
        Vec::new()
    };

    let command = capture_command(platform, &config.audio, &mac_devices);
    tracing::info!("Capture command: {}", command.display());

    // Shared raw PCM stream: the capture supervisor is the single
    // producer, the packetizer and each codec provider subscribe.
    let (pcm_tx, _) = broadcast::channel(RAW_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = CaptureSupervisor::new(command, pcm_tx.clone());
    let supervisor_state = supervisor.state_handle();
    tokio::spawn(supervisor.run(shutdown_rx));

    // Raw path: packetize and broadcast
    let raw = Arc::new(RawBroadcaster::new());
    spawn_packetizer(&config, pcm_tx.subscribe(), raw.clone());

    // Codec path: one provider per enabled codec
    let mut enabled = Vec::new();
    if config.codecs.mp3 {
        enabled.push(Codec::Mp3);
    }
    if config.codecs.opus {
        enabled.push(Codec::Opus);
    }

    let mut registry = CodecRegistry::new();
    let mut slots: Vec<(Codec, HeaderSlot)> = Vec::new();
    for codec in &enabled {
        let slot: HeaderSlot = Arc::new(parking_lot::RwLock::new(None));
        registry.register(*codec, slot.clone());
        slots.push((*codec, slot));
    }
    let registry = Arc::new(registry);

    let mut providers = Vec::new();
    for (codec, slot) in slots {
        match CodecProvider::spawn(
            codec,
            &config.audio,
            pcm_tx.subscribe(),
            slot,
            registry.clone(),
        ) {
            Ok(provider) => providers.push(provider),
            // Spawn failure leaves the codec registered but silent for
            // the process lifetime.
            Err(e) => tracing::error!("Failed to start {} transcoder: {}", codec, e),
        }
    }

    let state = Arc::new(AppState {
        raw: raw.clone(),
        registry: registry.clone(),
        supervisor_state,
        audio: config.audio.clone(),
    });

    tokio::select! {
        result = server::serve(&config.server, state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    // Teardown: stop the capture process, kill the encoders, drop every
    // client.
    let _ = shutdown_tx.send(true);
    for provider in providers {
        provider.shutdown().await;
    }
    registry.clear();
    raw.clear();

    Ok(())
}

/// Drain the raw stream through the packetizer into the raw broadcaster.
fn spawn_packetizer(
    config: &AppConfig,
    mut pcm_rx: broadcast::Receiver<bytes::Bytes>,
    raw: Arc<RawBroadcaster>,
) {
    let mut packetizer = Packetizer::new(
        config.audio.packet_bytes(),
        config.audio.sample_rate,
        config.audio.channels,
    );
    tokio::spawn(async move {
        loop {
            match pcm_rx.recv().await {
                Ok(chunk) => {
                    for packet in packetizer.push(&chunk) {
                        raw.publish(&packet);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Packetizer lagged, skipped {} capture chunks", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
