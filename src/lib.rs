//! # Live Audio Streamer
//!
//! Low-latency PCM capture, packetized fan-out and codec transcoding server.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               SERVER                                      │
//! │   ┌────────────────────┐                                                 │
//! │   │ Capture subprocess │  ffmpeg / sox / arecord                         │
//! │   │ (s16le PCM stdout) │                                                 │
//! │   └─────────┬──────────┘                                                 │
//! │             │ raw PCM bytes                                              │
//! │             ▼                                                            │
//! │   ┌────────────────────┐    tokio::broadcast (shared raw stream)         │
//! │   │ Capture Supervisor ├──────────────┬──────────────────┐               │
//! │   │ (capture::         │              │                  │               │
//! │   │  supervisor)       │              │                  │               │
//! │   └────────────────────┘              ▼                  ▼               │
//! │                             ┌──────────────────┐ ┌──────────────────┐    │
//! │                             │  Packetizer      │ │ Codec Providers  │    │
//! │                             │  (broadcast::    │ │ (codec::provider)│    │
//! │                             │   packetizer)    │ │  mp3 / opus      │    │
//! │                             └────────┬─────────┘ └────────┬─────────┘    │
//! │                                      │                    │              │
//! │                                      ▼                    ▼              │
//! │                             ┌──────────────────┐ ┌──────────────────┐    │
//! │                             │ Raw Broadcaster  │ │ Codec Registry   │    │
//! │                             │ (broadcast::raw) │ │ (broadcast::     │    │
//! │                             └────────┬─────────┘ │  registry)       │    │
//! │                                      │           └────────┬─────────┘    │
//! └──────────────────────────────────────┼────────────────────┼──────────────┘
//!                                        │ binary WS          │ WS / base64 SSE
//!                                        ▼                    ▼
//!                                  raw clients          codec clients
//! ```
//!
//! The capture subprocess is the single producer; its stdout is duplicated
//! through a broadcast channel so the packetizer and every enabled codec
//! transcoder consume independent views of the same byte stream.

pub mod broadcast;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio capture
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u8 = 2;

    /// Default encoder bitrate
    pub const DEFAULT_BITRATE: &str = "128k";

    /// Duration of one raw packet in milliseconds
    pub const PACKET_DURATION_MS: u32 = 20;

    /// Bytes per PCM sample (signed 16-bit)
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Restart backoff floor for the capture subprocess
    pub const RESTART_DELAY_FLOOR_MS: u64 = 2000;

    /// Restart backoff ceiling for the capture subprocess
    pub const RESTART_DELAY_CEIL_MS: u64 = 15000;

    /// How long a capture subprocess must stay alive before the
    /// restart backoff resets to the floor
    pub const STABLE_RUN_MS: u64 = 5000;

    /// Gain applied when the boost filter stage is enabled
    pub const BOOST_VOLUME: &str = "1.7";

    /// Matroska/WebM cluster-start marker (EBML Cluster element ID)
    pub const CLUSTER_MARKER: [u8; 4] = [0x1f, 0x43, 0xb6, 0x75];

    /// Cap on the WebM header scan buffer; past this the stream is
    /// flushed headerless rather than buffered forever
    pub const MAX_HEADER_SCAN_BYTES: usize = 1 << 20;

    /// Capacity of the shared raw-PCM broadcast channel, in chunks
    pub const RAW_CHANNEL_CAPACITY: usize = 64;

    /// Default HTTP/WebSocket port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}
